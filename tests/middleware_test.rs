//! Collaborator middleware against a live mux: heartbeat short-circuit,
//! HEAD to GET fallback, slash handling, client-address recovery, panic
//! recovery and request throttling.

mod common;

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use http::StatusCode;
use switchyard::middleware::{
    get_head, heartbeat, real_ip, recoverer, redirect_slashes, strip_slashes, throttle, RealIp,
};
use switchyard::{Error, Mux, Request, ResponseWriter, Router};

use common::{body, request, send};

#[test]
fn heartbeat_short_circuits_before_routing() {
    let mut m = Mux::new();
    m.use_middleware(heartbeat("/ping"));
    m.get("/hi", |w: &mut ResponseWriter, _: &mut Request| {
        w.write_str("hi");
        Ok(())
    });

    let m = Arc::new(m);
    let reply = send(&m, "GET", "/ping");
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, ".");
    assert_eq!(reply.headers["content-type"], "text/plain");

    // unrelated traffic and non-GET heartbeats pass through
    assert_eq!(body(&m, "GET", "/hi"), "hi");
    assert_eq!(send(&m, "POST", "/ping").status, StatusCode::NOT_FOUND);
}

#[test]
fn get_head_runs_the_get_handler_for_head_requests() {
    let mut m = Mux::new();
    m.use_middleware(get_head);
    m.get("/hi", |w: &mut ResponseWriter, _: &mut Request| {
        w.set_header("x-from-get", "1");
        w.write_str("hi body");
        Ok(())
    });
    m.head("/explicit", |w: &mut ResponseWriter, _: &mut Request| {
        w.set_header("x-explicit-head", "1");
        Ok(())
    });

    let m = Arc::new(m);

    // no HEAD route for /hi, so the GET handler serves the HEAD request
    let reply = send(&m, "HEAD", "/hi");
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["x-from-get"], "1");

    // an explicit HEAD route still wins
    let reply = send(&m, "HEAD", "/explicit");
    assert_eq!(reply.headers["x-explicit-head"], "1");
    assert!(!reply.headers.contains_key("x-from-get"));

    // plain GET is untouched
    assert_eq!(body(&m, "GET", "/hi"), "hi body");
}

#[test]
fn strip_slashes_rewrites_the_routing_path() {
    let mut m = Mux::new();
    m.use_middleware(strip_slashes);
    m.get("/accounts/admin", |w: &mut ResponseWriter, _: &mut Request| {
        w.write_str("admin");
        Ok(())
    });

    let m = Arc::new(m);
    assert_eq!(body(&m, "GET", "/accounts/admin"), "admin");
    assert_eq!(body(&m, "GET", "/accounts/admin/"), "admin");
    assert_eq!(send(&m, "GET", "/accounts/nope/").status, StatusCode::NOT_FOUND);
}

#[test]
fn redirect_slashes_issues_moved_permanently() {
    let mut m = Mux::new();
    m.use_middleware(redirect_slashes);
    m.get("/hi", |w: &mut ResponseWriter, _: &mut Request| {
        w.write_str("hi");
        Ok(())
    });

    let m = Arc::new(m);
    let reply = send(&m, "GET", "/hi/");
    assert_eq!(reply.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(reply.headers["location"], "/hi");

    let mut w = ResponseWriter::new();
    let mut req = request("GET", "/hi/?a=1");
    m.serve(&mut w, &mut req).unwrap();
    assert_eq!(w.headers()["location"], "/hi?a=1");
}

#[test]
fn real_ip_prefers_the_most_specific_header() {
    let mut m = Mux::new();
    m.use_middleware(real_ip);
    m.get("/", |w: &mut ResponseWriter, r: &mut Request| {
        let ip = r
            .extensions()
            .get::<RealIp>()
            .map(|ip| ip.0.clone())
            .unwrap_or_else(|| "-".to_string());
        w.write_str(&ip);
        Ok(())
    });
    let m = Arc::new(m);

    let mut req = request("GET", "/");
    req.headers_mut()
        .insert("x-forwarded-for", "100.100.100.100, 200.200.200.200".parse().unwrap());
    let mut w = ResponseWriter::new();
    m.serve(&mut w, &mut req).unwrap();
    assert_eq!(w.body(), b"100.100.100.100");

    let mut req = request("GET", "/");
    req.headers_mut()
        .insert("x-forwarded-for", "100.100.100.100".parse().unwrap());
    req.headers_mut()
        .insert("x-real-ip", "150.150.150.150".parse().unwrap());
    let mut w = ResponseWriter::new();
    m.serve(&mut w, &mut req).unwrap();
    assert_eq!(w.body(), b"150.150.150.150");

    // no proxy headers at all
    let mut req = request("GET", "/");
    let mut w = ResponseWriter::new();
    m.serve(&mut w, &mut req).unwrap();
    assert_eq!(w.body(), b"-");
}

#[test]
fn recoverer_converts_panics_into_500s() {
    let mut m = Mux::new();
    m.use_middleware(recoverer);
    m.get("/boom", |_: &mut ResponseWriter, _: &mut Request| -> Result<(), Error> {
        panic!("oh no")
    });
    m.get("/fine", |w: &mut ResponseWriter, _: &mut Request| {
        w.write_str("fine");
        Ok(())
    });

    let m = Arc::new(m);
    let reply = send(&m, "GET", "/boom");
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);

    // the mux keeps serving afterwards
    assert_eq!(body(&m, "GET", "/fine"), "fine");
    assert_eq!(body(&m, "GET", "/boom").is_empty(), false);
}

#[test]
fn throttle_rejects_requests_over_capacity() {
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    let release_rx = Mutex::new(release_rx);

    let mut m = Mux::new();
    m.use_middleware(throttle(1));
    m.get("/slow", move |w: &mut ResponseWriter, _: &mut Request| {
        entered_tx.lock().unwrap().send(()).unwrap();
        release_rx.lock().unwrap().recv().unwrap();
        w.write_str("done");
        Ok(())
    });

    let m = Arc::new(m);

    let m_bg = Arc::clone(&m);
    let blocked = thread::spawn(move || body(&m_bg, "GET", "/slow"));

    // wait until the first request is inside the handler, holding the slot
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("first request entered");

    let reply = send(&m, "GET", "/slow");
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(reply.body, "server capacity exceeded\n");

    release_tx.send(()).unwrap();
    assert_eq!(blocked.join().unwrap(), "done");

    // with the slot free again the route serves normally
    while entered_rx.try_recv().is_ok() {}
    let m_fg = Arc::clone(&m);
    let second = thread::spawn(move || body(&m_fg, "GET", "/slow"));
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("second request entered");
    release_tx.send(()).unwrap();
    assert_eq!(second.join().unwrap(), "done");
}

#[derive(Clone)]
struct TestValue(&'static str);

#[test]
fn request_extensions_reach_handlers_and_fallbacks() {
    let mut r = Mux::new();
    r.get("/hi", |w: &mut ResponseWriter, rq: &mut Request| {
        let v = rq.extensions().get::<TestValue>().map(|v| v.0).unwrap_or("");
        w.write_str(v);
        Ok(())
    });
    r.not_found(|_: &mut ResponseWriter, rq: &mut Request| {
        let v = rq.extensions().get::<TestValue>().map(|v| v.0).unwrap_or("");
        Err(Error::with_message(StatusCode::NOT_FOUND, v))
    });
    let r = Arc::new(r);

    let mut req = request("GET", "/hi");
    req.extensions_mut().insert(TestValue("hi ctx"));
    let mut w = ResponseWriter::new();
    r.serve(&mut w, &mut req).unwrap();
    assert_eq!(w.body(), b"hi ctx");

    let mut req = request("GET", "/hello");
    req.extensions_mut().insert(TestValue("nothing here ctx"));
    let mut w = ResponseWriter::new();
    let err = r.serve(&mut w, &mut req).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(err.message(), "nothing here ctx");
}
