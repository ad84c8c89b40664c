use spindle::net::{Client, Connection, ServerState, Socket, Udp};
use spindle::{Error, Executors, MemoryStream, Server, ServerBuilder};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

fn fetch(port: u16, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    if !request.is_empty() {
        stream.write_all(request).expect("write request");
        stream.shutdown(Shutdown::Write).expect("half close");
    }

    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read response");
    response
}

fn read_request(connection: &mut Connection) -> spindle::Result<String> {
    let mut request = Vec::new();
    connection.input().read_to_end(&mut request)?;
    Ok(String::from_utf8_lossy(&request).into_owned())
}

#[test]
fn hello_world_to_concurrent_clients() {
    let mut server = Server::new().expect("server");
    server.set_connection_handler(|connection| connection.output().write_str("Hello World"));
    server.start(0).expect("start");
    let port = server.port().expect("bound port");

    let clients: Vec<_> = (0..8)
        .map(|_| thread::spawn(move || fetch(port, b"")))
        .collect();

    for client in clients {
        assert_eq!(client.join().expect("client thread"), "Hello World");
    }
    server.shutdown();
}

#[test]
fn lifecycle_states() {
    let mut server = Server::new().expect("server");
    assert_eq!(server.state(), ServerState::Created);
    assert!(server.local_addr().is_none());

    server.start(0).expect("start");
    assert_eq!(server.state(), ServerState::Accepting);
    assert!(matches!(server.start(0), Err(Error::AlreadyStarted)));

    let port = server.port().expect("bound port");
    server.shutdown();
    server.shutdown();

    assert_eq!(server.state(), ServerState::Stopped);
    assert!(server.is_stopped());
    assert!(matches!(server.start(0), Err(Error::AlreadyStarted)));
    assert!(Socket::connect("127.0.0.1", port).is_err());
}

#[test]
fn failing_handlers_do_not_stop_server() {
    let mut server = Server::builder()
        .worker_threads(2)
        .handler(|connection| {
            let request = read_request(connection)?;
            match request.as_str() {
                "panic" => panic!("handler blew up"),
                "fail" => Err(Error::Config("refusing request".into())),
                _ => connection.output().write_str("ok"),
            }
        })
        .build()
        .expect("server");
    server.start(0).expect("start");
    let port = server.port().expect("bound port");

    assert_eq!(fetch(port, b"panic"), "");
    assert_eq!(fetch(port, b"fail"), "");
    assert_eq!(fetch(port, b"hello"), "ok");
    assert_eq!(server.state(), ServerState::Accepting);
}

#[test]
fn echo_through_client() {
    let mut server = Server::builder()
        .buffer_size(8)
        .handler(|connection| {
            let request = read_request(connection)?;
            connection.output().write_str(&request.to_uppercase())
        })
        .build()
        .expect("server");
    server.start(0).expect("start");
    let port = server.port().expect("bound port");

    let client = Client::new().expect("client").buffer_size(4);
    let mut connection = client.send("127.0.0.1", port).expect("connect");
    assert!(connection.address().contains(&port.to_string()));

    connection.output().write_str("a longer message").expect("write");
    connection.output().close().expect("close output");

    let mut reply = Vec::new();
    connection.input().read_to_end(&mut reply).expect("read reply");
    assert_eq!(reply, b"A LONGER MESSAGE");

    connection.close().expect("close");
    assert!(connection.is_closed());
}

#[test]
fn send_async_with_executor() {
    let mut server = Server::new().expect("server");
    server.set_connection_handler(|connection| connection.output().write_str("async hello"));
    server.start(0).expect("start");
    let port = server.port().expect("bound port");

    let pool = Executors::new_fixed_thread_pool(2).expect("executor");
    let (reply_tx, reply_rx) = mpsc::channel();

    let handle = Client::new().expect("client").send_async_with(
        "127.0.0.1",
        port,
        move |connection| {
            let reply = connection.input().read_string(64)?;
            let _ = reply_tx.send(reply);
            Ok(())
        },
        pool.as_ref(),
    );

    handle.join().expect("job").expect("handler");
    assert_eq!(
        reply_rx.recv_timeout(Duration::from_secs(5)).expect("reply"),
        "async hello"
    );
    pool.shutdown();
}

#[test]
fn send_async_reports_connect_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let handle = Client::new()
        .expect("client")
        .send_async("127.0.0.1", port, |_connection| Ok(()))
        .expect("global dispatchers");

    let result = handle.join().expect("job ran");
    assert!(matches!(result, Err(Error::Connection { .. })));
}

#[test]
fn udp_echo() {
    let mut server = ServerBuilder::udp()
        .worker_threads(2)
        .handler(|connection| {
            let request = connection.input().read_string(64)?;
            connection.output().write_str(&request.to_uppercase())
        })
        .build()
        .expect("server");
    server.start(0).expect("start");
    let port = server.port().expect("bound port");

    let client = Client::with_transport(Udp).expect("client");
    let mut connection = client.send("127.0.0.1", port).expect("connect");

    connection.output().write_str("ping").expect("write");
    connection.output().flush().expect("flush");

    assert_eq!(connection.input().read_string(64).expect("reply"), "PING");
    server.shutdown();
}

#[test]
fn set_executor_rules() {
    let mut server = Server::new().expect("server");

    let single = Executors::new_single_thread_executor().expect("executor");
    assert!(matches!(server.set_executor(single), Err(Error::Config(_))));

    let pool = Executors::new_fixed_thread_pool(2).expect("executor");
    server.set_executor(pool.clone()).expect("set executor");
    server.start(0).expect("start");

    let other = Executors::new_fixed_thread_pool(2).expect("executor");
    assert!(matches!(server.set_executor(other), Err(Error::AlreadyStarted)));

    server.shutdown();
    assert!(pool.is_shutdown());
}

#[test]
fn start_on_shut_down_executor_rolls_back() {
    let mut server = Server::new().expect("server");
    let pool = Executors::new_fixed_thread_pool(2).expect("executor");
    server.set_executor(pool.clone()).expect("set executor");
    pool.shutdown();

    assert!(matches!(server.start(0), Err(Error::Rejected)));
    assert_eq!(server.state(), ServerState::Created);
    assert!(server.local_addr().is_none());

    assert!(matches!(server.set_executor(pool), Err(Error::Rejected)));

    let fresh = Executors::new_fixed_thread_pool(2).expect("executor");
    server.set_executor(fresh).expect("replace executor");
    server.start(0).expect("start");
    assert_eq!(server.state(), ServerState::Accepting);
    assert!(server.port().is_some());
    server.shutdown();
}

#[test]
fn builder_validation() {
    assert!(matches!(
        ServerBuilder::tcp().worker_threads(1).build(),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        ServerBuilder::tcp().buffer_size(0).build(),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        ServerBuilder::tcp().accept_poll_interval(Duration::ZERO).build(),
        Err(Error::Config(_))
    ));

    let single = Executors::new_single_thread_executor().expect("executor");
    assert!(matches!(
        ServerBuilder::tcp().executor(single).build(),
        Err(Error::Config(_))
    ));
}

#[test]
fn shutdown_waits_for_in_flight_handler() {
    let finished = Arc::new(AtomicBool::new(false));
    let finished_handler = finished.clone();
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = std::sync::Mutex::new(started_tx);

    let mut server = Server::builder()
        .handler(move |connection| {
            let _ = started_tx.lock().map(|sender| sender.send(()));
            thread::sleep(Duration::from_millis(100));
            finished_handler.store(true, Ordering::SeqCst);
            connection.output().write_str("late")
        })
        .build()
        .expect("server");
    server.start(0).expect("start");
    let port = server.port().expect("bound port");

    let client = thread::spawn(move || fetch(port, b""));
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("handler started");

    server.shutdown();
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(client.join().expect("client thread"), "late");
}

#[test]
fn connection_over_memory_streams() {
    let mut connection = Connection::new(
        Box::new(MemoryStream::from_bytes("request")),
        Box::new(MemoryStream::new()),
        "memory",
    );

    assert_eq!(connection.input().read_string(32).expect("read"), "request");
    connection.output().write_str("reply").expect("write");

    connection.close().expect("close");
    connection.close().expect("second close");
    assert!(connection.is_closed());
    assert!(format!("{connection:?}").contains("memory"));
}
