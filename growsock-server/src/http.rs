//! HTTP `server_data` endpoint.
//!
//! Game clients query `/growtopia/server_data.php` to learn where the game
//! server listens before opening the datagram connection.

use crate::config::HttpConfig;
use crate::error::ServerError;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Path served by the endpoint.
pub const SERVER_DATA_PATH: &str = "/growtopia/server_data.php";

/// Builds the `server_data` response body.
pub fn server_data(config: &HttpConfig) -> String {
    format!(
        concat!(
            "server|{}\n",
            "port|{}\n",
            "type|1\n",
            "#maint|Server is under maintenance.\n",
            "meta|localhost\n",
            "RTENDMARKERBS1001",
        ),
        config.server_ip, config.server_port
    )
}

/// Runs the HTTP server until a shutdown signal arrives.
pub async fn run_http_server(
    config: HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        "HTTP server listening on http://{}{}",
        config.bind_addr,
        SERVER_DATA_PATH
    );

    let body = Arc::new(server_data(&config));

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let body = body.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let body = body.clone();
                                async move { handle_request(req, body).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::debug!("[{}] HTTP connection error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("HTTP accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("HTTP server shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_request<B>(
    req: Request<B>,
    body: Arc<String>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path(), &body))
}

fn route(path: &str, body: &str) -> Response<Full<Bytes>> {
    if path == SERVER_DATA_PATH {
        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("text/html"),
        );
        response
    } else {
        let mut response = Response::new(Full::new(Bytes::from("Not Found")));
        *response.status_mut() = StatusCode::NOT_FOUND;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_server_data_body() {
        let config = HttpConfig {
            server_ip: "10.0.0.5".to_string(),
            server_port: 17200,
            ..Default::default()
        };
        let body = server_data(&config);

        assert!(body.starts_with("server|10.0.0.5\nport|17200\n"));
        assert!(body.ends_with("RTENDMARKERBS1001"));
    }

    #[test]
    fn test_route() {
        let response = route(SERVER_DATA_PATH, "server|x");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[hyper::header::CONTENT_TYPE], "text/html");

        let response = route("/other", "server|x");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        // Reserve a free port, then release it for the server.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let config = HttpConfig {
            enabled: true,
            bind_addr: addr,
            ..Default::default()
        };
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let server = tokio::spawn(run_http_server(config, shutdown_rx));

        let mut stream = None;
        for _ in 0..50 {
            match tokio::net::TcpStream::connect(addr).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        }
        let mut stream = stream.expect("HTTP server did not start");

        stream
            .write_all(
                b"POST /growtopia/server_data.php HTTP/1.1\r\n\
                  Host: localhost\r\n\
                  Content-Length: 0\r\n\
                  Connection: close\r\n\r\n",
            )
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("port|17091"));

        shutdown_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
