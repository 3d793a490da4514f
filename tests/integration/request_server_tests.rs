//! The request server over real TCP, backed by the assembled controller.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use fishfeeder::app::ports::Worker;
use fishfeeder::rpc::server::RequestServer;
use serde_json::Value;

use super::mock_hw::{Rig, fish_scene};

struct Served {
    rig: Rig,
    server: RequestServer,
}

impl Served {
    fn new(tag: &str, auto_mode: bool) -> Self {
        let rig = Rig::new(tag, auto_mode, fish_scene());
        rig.controller.start();
        let server = RequestServer::bind(&rig.config.server, rig.controller.clone()).unwrap();
        server.start().unwrap();
        Self { rig, server }
    }

    fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    fn get(&self) -> (u16, Value) {
        let (status, body) = exchange(self.addr(), "GET / HTTP/1.1\r\nHost: feeder\r\nConnection: close\r\n\r\n");
        (status, serde_json::from_str(&body).unwrap())
    }

    fn post(&self, body: &str) -> (u16, Value) {
        let request = format!(
            "POST / HTTP/1.1\r\nHost: feeder\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let (status, body) = exchange(self.addr(), &request);
        (status, serde_json::from_str(&body).unwrap())
    }
}

impl Drop for Served {
    fn drop(&mut self) {
        self.server.stop();
    }
}

/// Send one raw request; return the status code and body.
fn exchange(addr: SocketAddr, request: &str) -> (u16, String) {
    let (status, _, body) = exchange_raw(addr, request);
    (status, body)
}

fn exchange_raw(addr: SocketAddr, request: &str) -> (u16, String, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).unwrap();

    let (head, body) = reply.split_once("\r\n\r\n").unwrap();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    (status, head.to_owned(), body.to_owned())
}

#[test]
fn stop_releases_clients_and_restarts() {
    let s = Served::new("restart", false);

    s.server.stop();
    assert!(!s.server.is_running());
    s.server.start().unwrap();

    assert_eq!(s.get().0, 200);
}

#[test]
fn get_reports_status_envelope() {
    let s = Served::new("get", true);

    let (status, json) = s.get();

    assert_eq!(status, 200);
    assert_eq!(json["success"], true);
    let data = &json["data"];
    assert_eq!(data["feed_count"], 0);
    assert_eq!(data["auto_feed_count"], 0);
    assert_eq!(data["auto_mode_enabled"], true);
    assert_eq!(data["motor_initialized"], true);
    assert_eq!(data["fish_detected"], false);
    assert_eq!(data["last_feed_time"], "Never");
    assert_eq!(data["last_ph_read_time"], "Never");
    assert!(data["current_time"].as_u64().unwrap() > 0);
}

#[test]
fn post_feed_with_override_feeds_once() {
    let s = Served::new("post-feed", false);

    let (status, json) = s.post(r#"{"command":"feed_fish","override":true}"#);

    assert_eq!(status, 200);
    assert_eq!(json, serde_json::json!({ "success": true }));
    assert_eq!(s.rig.controller.system_status().feed_count(), 1);
    let (_, json) = s.get();
    assert_eq!(json["data"]["feed_count"], 1);
    assert_ne!(json["data"]["last_feed_time"], "Never");
}

#[test]
fn post_feed_without_override_is_refused() {
    let s = Served::new("post-denied", false);

    let (status, json) = s.post(r#"{"command":"feed_fish"}"#);

    assert_eq!(status, 200);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "no fish detected and no override");
    assert_eq!(s.rig.controller.system_status().feed_count(), 0);
}

#[test]
fn post_read_ph_then_get_shows_reading() {
    let s = Served::new("post-ph", false);

    let (_, json) = s.post(r#"{"command":"read_ph"}"#);
    assert_eq!(json["success"], true);

    let (_, json) = s.get();
    assert_eq!(json["data"]["current_ph_adc_value"], 16_383);
    assert_ne!(json["data"]["last_ph_read_time"], "Never");
}

#[test]
fn post_set_auto_mode_toggles() {
    let s = Served::new("post-auto", true);

    let (_, json) = s.post(r#"{"command":"set_auto_mode","enabled":false}"#);
    assert_eq!(json["success"], true);
    assert!(!s.rig.controller.auto_mode());

    let (_, json) = s.post(r#"{"command":"set_auto_mode"}"#);
    assert_eq!(json["success"], false);
    assert!(!s.rig.controller.auto_mode());
}

#[test]
fn post_sensor_init_accepts_both_names() {
    let s = Served::new("post-init", false);

    for body in [
        r#"{"command":"init_analog_sensor"}"#,
        r#"{"command":"init_ph_sensor"}"#,
    ] {
        let (_, json) = s.post(body);
        assert_eq!(json["success"], true, "{body}");
    }
}

#[test]
fn post_run_motor_uses_defaults_when_omitted() {
    let s = Served::new("post-run", false);
    s.rig.controls.motor.clear_history();

    let (_, json) = s.post(r#"{"command":"run_motor","duration":100}"#);

    assert_eq!(json["success"], true);
    assert!(s.rig.controls.motor.history().iter().any(|(high, _)| *high));
    assert!(!s.rig.controls.motor.is_high());
}

#[test]
fn bad_payloads_are_reported_not_fatal() {
    let s = Served::new("post-bad", false);

    for body in ["{not json", r#"{"duty_cycle":5}"#, r#"{"command":"dance"}"#] {
        let (status, json) = s.post(body);
        assert_eq!(status, 200);
        assert_eq!(json["success"], false, "{body}");
        assert!(json["message"].is_string());
    }
    // Still serving afterwards.
    assert_eq!(s.get().0, 200);
}

#[test]
fn options_and_unknown_methods() {
    let s = Served::new("methods", false);

    let (status, head, body) = exchange_raw(s.addr(), "OPTIONS / HTTP/1.1\r\nHost: feeder\r\nConnection: close\r\n\r\n");
    assert_eq!(status, 204);
    assert!(head.to_ascii_lowercase().contains("access-control-allow-origin: *"));
    assert!(body.is_empty());

    let (status, _) = exchange(s.addr(), "DELETE / HTTP/1.1\r\nHost: feeder\r\nConnection: close\r\n\r\n");
    assert_eq!(status, 405);
}
