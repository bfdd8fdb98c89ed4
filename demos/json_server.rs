//! Answers every request with a small JSON document until Enter is pressed.
//!
//! Run with `RUST_LOG=debug cargo run --example json_server`.

use std::io;

use log::info;
use microhttp_reactor::{Connection, Handler, HttpResponse, HttpServer, ServerConfig, ServerHandle, StatusCode};

struct JsonServer;

impl Handler for JsonServer {
    fn on_start(&mut self, server: &ServerHandle) {
        println!("HTTP Server running on http://{}", server.local_addr());
    }

    fn on_request(&mut self, connection: &mut Connection) {
        info!(
            "{} {:?} {:?}",
            connection.peer_addr(),
            connection.request_method(),
            connection.request_uri()
        );

        let response = HttpResponse::new(StatusCode::Ok)
            .with_content_type("application/json")
            .with_body_string("{\"test\":\"good\"}");
        if let Err(e) = connection.send_response(&response) {
            eprintln!("Error sending response: {e}");
        }
    }

    fn on_close(&mut self, connection: &Connection) {
        info!("{} disconnected", connection.peer_addr());
    }

    fn on_stop(&mut self) {
        println!("stop HTTP Server.");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let server = HttpServer::new(ServerConfig::default().with_port(2015), JsonServer).start()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;

    server.shutdown();
    server.wait()?;
    Ok(())
}
