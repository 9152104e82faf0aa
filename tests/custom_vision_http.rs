use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use url::Url;

use vision_guard::config::InferenceSettings;
use vision_guard::{CustomVisionClient, Frame, InferenceBackend, InferenceError, Secret};

struct CapturedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Serves exactly one request with a canned response.
fn serve_once(status: &str, body: &str) -> (Url, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        let length = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
            .map(|(_, value)| value.parse::<usize>().unwrap())
            .unwrap_or(0);
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).unwrap();

        let mut stream = stream;
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        CapturedRequest {
            request_line: request_line.trim_end().to_string(),
            headers,
            body,
        }
    });
    let url = Url::parse(&format!("http://{}/customvision/detect/image", addr)).unwrap();
    (url, handle)
}

fn client(endpoint: Url) -> CustomVisionClient {
    CustomVisionClient::new(&InferenceSettings {
        endpoint,
        key: Secret::new("prediction-key-123"),
        timeout: Duration::from_secs(5),
    })
}

fn frame() -> Frame {
    Frame::new(7, 4, 2, vec![128; 4 * 2 * 3]).unwrap()
}

#[test]
fn posts_jpeg_with_prediction_key_and_parses_predictions() {
    let (url, server) = serve_once(
        "200 OK",
        r#"{"id":"r1","project":"p","predictions":[
            {"probability":0.93,"tagId":"t1","tagName":"knife",
             "boundingBox":{"left":0.1,"top":0.2,"width":0.3,"height":0.4}},
            {"probability":0.12,"tagId":"t2","tagName":"scissors",
             "boundingBox":{"left":0.5,"top":0.5,"width":0.1,"height":0.1}}
        ]}"#,
    );
    let mut client = client(url);

    let predictions = client.infer(&frame()).unwrap();
    let request = server.join().unwrap();

    assert!(request.request_line.starts_with("POST /customvision/detect/image"));
    assert_eq!(request.header("Prediction-Key"), Some("prediction-key-123"));
    assert_eq!(
        request.header("Content-Type"),
        Some("application/octet-stream")
    );
    assert_eq!(&request.body[..2], &[0xFF, 0xD8]);

    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].tag_name, "knife");
    assert_eq!(predictions[0].probability, 0.93);
    assert_eq!(predictions[1].bounding_box.left, 0.5);
}

#[test]
fn error_status_carries_status_and_json_body() {
    let (url, server) = serve_once(
        "401 Unauthorized",
        r#"{"code":"Unauthorized","message":"Access denied due to invalid subscription key."}"#,
    );
    let mut client = client(url);

    let err = client.infer(&frame()).unwrap_err();
    server.join().unwrap();

    match err {
        InferenceError::Backend { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body["code"], "Unauthorized");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn success_without_predictions_is_malformed() {
    let (url, server) = serve_once("200 OK", r#"{"id":"r1"}"#);
    let mut client = client(url);

    let err = client.infer(&frame()).unwrap_err();
    server.join().unwrap();

    assert!(matches!(err, InferenceError::MalformedResponse(_)));
}

#[test]
fn unreachable_endpoint_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = Url::parse(&format!("http://{}/image", addr)).unwrap();
    let mut client = client(url);

    let err = client.infer(&frame()).unwrap_err();
    assert!(matches!(err, InferenceError::Transport(_)));
}
