//! Tests for the HTTP parser.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use serde::{Deserialize, Serialize};

    use crate::parser::{Error, HttpRequest, HttpVersion, Method, ParseState, RequestParser, parse_request};

    const POST: &[u8] = b"POST /api/items?sort=asc HTTP/1.1\r\nHost: example.com\r\nContent-Type: application/json\r\nContent-Length: 15\r\n\r\n{\"test\":\"good\"}";

    fn feed_in_chunks(input: &[u8], sizes: &[usize]) -> Result<Vec<HttpRequest>, Error> {
        let mut parser = RequestParser::new(1 << 20);
        let mut completed = Vec::new();
        let mut rest = input;
        let mut sizes = sizes.iter().cycle();

        while !rest.is_empty() {
            let n = (*sizes.next().unwrap()).min(rest.len());
            let (chunk, tail) = rest.split_at(n);
            rest = tail;
            if let Some(request) = parser.feed(chunk)? {
                completed.push(request);
            }
        }
        Ok(completed)
    }

    #[test]
    fn test_parse_simple_get_request() {
        let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request).unwrap();
        assert_eq!(result.method, Method::GET);
        assert_eq!(result.path, "/index.html");
        assert_eq!(result.version, HttpVersion::Http11);
        assert_eq!(result.get_header("Host").unwrap(), "example.com");
        assert!(result.body.is_empty());
    }

    #[test]
    fn test_parse_request_with_body_and_query() {
        let result = parse_request(POST).unwrap();
        assert_eq!(result.method, Method::POST);
        assert_eq!(result.path, "/api/items?sort=asc");
        assert_eq!(result.body, b"{\"test\":\"good\"}");
        assert_eq!(result.get_query_param("sort").unwrap(), "asc");
        assert!(!result.has_query_param("page"));
    }

    #[test]
    fn test_case_insensitive_headers() {
        let request = b"GET / HTTP/1.1\r\nHOST: example.com\r\n\r\n";
        let result = parse_request(request).unwrap();
        assert!(result.has_header("host"));
        assert!(result.has_header("Host"));
        assert_eq!(result.headers.get("host").unwrap(), "example.com");
    }

    #[test]
    fn test_duplicate_headers_last_write_wins() {
        let request = b"GET / HTTP/1.1\r\nHost: a\r\nX-Tag: one\r\nx-tag: two\r\n\r\n";
        let result = parse_request(request).unwrap();
        assert_eq!(result.get_header("X-Tag").unwrap(), "two");
        assert_eq!(result.headers.len(), 2);
    }

    #[test]
    fn test_header_value_whitespace_is_trimmed() {
        let request = b"GET / HTTP/1.1\r\nHost:\t  example.com  \r\nEmpty:\r\n\r\n";
        let result = parse_request(request).unwrap();
        assert_eq!(result.get_header("host").unwrap(), "example.com");
        assert_eq!(result.get_header("empty").unwrap(), "");
    }

    #[test]
    fn test_chunking_does_not_change_result() {
        let whole = parse_request(POST).unwrap();

        let cases: [&[usize]; 5] = [&[1], &[2, 7], &[3, 1, 10], &[17], &[POST.len()]];
        for sizes in cases {
            let parsed = feed_in_chunks(POST, sizes).unwrap();
            assert_eq!(parsed.len(), 1, "chunk sizes {sizes:?}");
            assert_eq!(parsed[0], whole, "chunk sizes {sizes:?}");
        }
    }

    #[test]
    fn test_terminator_split_across_feeds() {
        let mut parser = RequestParser::new(1024);
        assert!(parser.feed(b"GET /x HTTP/1.1\r\nHost: h\r").unwrap().is_none());
        assert_eq!(parser.state(), ParseState::Head);
        assert!(parser.feed(b"\n\r").unwrap().is_none());
        let request = parser.feed(b"\n").unwrap().unwrap();
        assert_eq!(request.path, "/x");
        assert_eq!(parser.state(), ParseState::Complete);
    }

    #[test]
    fn test_body_state_until_content_length_arrives() {
        let mut parser = RequestParser::new(1024);
        assert!(parser.feed(b"PUT /k HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\nab").unwrap().is_none());
        assert_eq!(parser.state(), ParseState::Body);
        let request = parser.feed(b"cd").unwrap().unwrap();
        assert_eq!(request.body, b"abcd");
    }

    #[test]
    fn test_pipelined_request_waits_for_reset() {
        let mut parser = RequestParser::new(1024);
        let input = b"GET /a HTTP/1.1\r\nHost: h\r\n\r\nGET /b HTTP/1.1\r\nHost: h\r\n\r\n";

        let first = parser.feed(input).unwrap().unwrap();
        assert_eq!(first.path, "/a");
        // Further input is only buffered while the first request is outstanding
        assert!(parser.feed(b"").unwrap().is_none());
        assert_eq!(parser.buffered(), input.len() / 2);

        let second = parser.reset().unwrap().unwrap();
        assert_eq!(second.path, "/b");
        assert!(parser.reset().unwrap().is_none());
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_leading_blank_lines_are_skipped() {
        let result = parse_request(b"\r\n\r\nGET / HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(result.version, HttpVersion::Http10);
    }

    #[test]
    fn test_leading_blank_lines_split_at_every_cut() {
        let input: &[u8] = b"\r\n\r\nGET / HTTP/1.0\r\n\r\n";
        let whole = parse_request(input).unwrap();

        for cut in 1..input.len() {
            let mut parser = RequestParser::new(1024);
            let (first, second) = input.split_at(cut);
            let early = parser.feed(first).unwrap();
            let request = match early {
                Some(request) => request,
                None => parser.feed(second).unwrap().unwrap_or_else(|| panic!("no request at cut {cut}")),
            };
            assert_eq!(request, whole, "cut {cut}");
        }
    }

    #[test]
    fn test_missing_host_header() {
        let request = b"GET /index.html HTTP/1.1\r\n\r\n";
        let result = parse_request(request);
        assert!(matches!(result, Err(Error::MissingHeader(ref h)) if h == "Host"));
    }

    #[test]
    fn test_http10_does_not_need_host() {
        let result = parse_request(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(result.wants_close());
    }

    #[test]
    fn test_wants_close() {
        let keep = parse_request(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
        assert!(!keep.wants_close());

        let close = parse_request(b"GET / HTTP/1.1\r\nHost: h\r\nConnection: Close\r\n\r\n").unwrap();
        assert!(close.wants_close());

        let old_keep = parse_request(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(!old_keep.wants_close());
    }

    #[test]
    fn test_invalid_method() {
        let request = b"INVALID /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request);
        assert!(matches!(result, Err(Error::InvalidMethod(ref m)) if m == "INVALID"));
    }

    #[test]
    fn test_invalid_http_version() {
        let request = b"GET /index.html HTTP/2.0\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request);
        assert!(matches!(result, Err(Error::InvalidVersion(ref v)) if v == "HTTP/2.0"));
    }

    #[test]
    fn test_malformed_request_lines() {
        for line in ["GET\r\n\r\n", "GET  / HTTP/1.1\r\n\r\n", "GET / HTTP/1.1 extra\r\n\r\n"] {
            let result = parse_request(line.as_bytes());
            assert!(matches!(result, Err(Error::MalformedRequestLine(_))), "{line:?}");
        }
    }

    #[test]
    fn test_invalid_header_format() {
        for head in [
            "GET / HTTP/1.1\r\nHost: h\r\nInvalidHeader\r\n\r\n",
            "GET / HTTP/1.1\r\nHost : h\r\n\r\n",
            "GET / HTTP/1.1\r\nHost: h\r\n folded\r\n\r\n",
            "GET / HTTP/1.1\r\n: empty\r\n\r\n",
        ] {
            let result = parse_request(head.as_bytes());
            assert!(matches!(result, Err(Error::InvalidHeaderFormat(_))), "{head:?}");
        }
    }

    #[test]
    fn test_invalid_content_length() {
        let request = b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: -1\r\n\r\n";
        assert!(matches!(parse_request(request), Err(Error::InvalidContentLength(_))));
    }

    #[test]
    fn test_transfer_encoding_rejected() {
        let request = b"POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        assert!(matches!(parse_request(request), Err(Error::UnsupportedTransferEncoding(ref c)) if c == "chunked"));
    }

    #[test]
    fn test_oversized_head_rejected_before_terminator() {
        let mut parser = RequestParser::new(32);
        let result = parser.feed(b"GET / HTTP/1.1\r\nHost: a-very-long-host-name");
        assert!(matches!(result, Err(Error::RequestTooLarge { limit: 32 })));
    }

    #[test]
    fn test_oversized_body_rejected_from_header() {
        let mut parser = RequestParser::new(64);
        let result = parser.feed(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 1000\r\n\r\n");
        assert!(matches!(result, Err(Error::RequestTooLarge { limit: 64 })));
    }

    #[test]
    fn test_invalid_utf8_head() {
        let result = parse_request(b"GET /\xff HTTP/1.1\r\nHost: h\r\n\r\n");
        assert!(matches!(result, Err(Error::InvalidEncoding)));
    }

    #[test]
    fn test_empty_and_incomplete_request() {
        assert!(matches!(parse_request(b""), Err(Error::EmptyRequest)));
        assert!(matches!(parse_request(b"GET / HTTP/1.1\r\n"), Err(Error::Incomplete)));
    }

    #[test]
    fn test_json_body() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Payload {
            test: String,
        }

        let request = parse_request(POST).unwrap();
        assert!(request.is_json());
        let payload: Payload = request.json().unwrap();
        assert_eq!(payload, Payload { test: "good".to_string() });
    }

    #[test]
    fn test_json_requires_content_type() {
        let mut headers = HashMap::new();
        headers.insert("Host".to_string(), "h".to_string());
        let request = HttpRequest::with_body(Method::POST, "/".to_string(), HttpVersion::Http11, headers, b"{}".to_vec());
        let result: Result<serde_json::Value, _> = request.json();
        assert!(matches!(result, Err(Error::MissingHeader(_))));
        assert!(request.has_header("host"));
    }
}
