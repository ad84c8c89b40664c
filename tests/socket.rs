use spindle::Error;
use spindle::net::{self, DatagramSocket, ServerSocket, Socket};
use std::thread;
use std::time::{Duration, Instant};

fn listening_server() -> (ServerSocket, u16) {
    let server = ServerSocket::bind(0).expect("bind");
    server.listen().expect("listen");
    let port = server.local_addr().expect("local addr").port();
    (server, port)
}

#[test]
fn round_trip_with_half_close() {
    let (server, port) = listening_server();

    let client = thread::spawn(move || {
        let socket = Socket::connect("127.0.0.1", port).expect("connect");
        assert_eq!(socket.send(b"ping").expect("send"), 4);
        socket.shutdown().expect("half close");

        let mut reply = Vec::new();
        let mut buf = [0u8; 16];
        loop {
            let n = socket.receive(&mut buf).expect("receive");
            if n == 0 {
                break;
            }
            reply.extend_from_slice(&buf[..n]);
        }
        reply
    });

    let accepted = server.accept().expect("accept");
    let mut request = Vec::new();
    let mut buf = [0u8; 16];
    loop {
        let n = accepted.receive(&mut buf).expect("receive");
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
    }
    assert_eq!(request, b"ping");

    accepted.send(b"pong").expect("send");
    drop(accepted);

    assert_eq!(client.join().expect("client thread"), b"pong");
}

#[test]
fn accept_timeout_without_peer() {
    let (server, _port) = listening_server();

    let start = Instant::now();
    let accepted = server
        .accept_timeout(Duration::from_millis(30))
        .expect("accept_timeout");

    assert!(accepted.is_none());
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
fn accept_timeout_with_peer() {
    let (server, port) = listening_server();
    let _client = Socket::connect("127.0.0.1", port).expect("connect");

    let accepted = server
        .accept_timeout(Duration::from_secs(5))
        .expect("accept_timeout");
    assert!(accepted.is_some());
}

#[test]
fn connect_to_closed_port_fails() {
    let port = {
        let (server, port) = listening_server();
        drop(server);
        port
    };

    match Socket::connect("127.0.0.1", port) {
        Err(Error::Connection { context, .. }) => assert!(context.contains(&port.to_string())),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn unresolvable_host_fails() {
    let result = Socket::connect("host.invalid", 80);
    assert!(matches!(result, Err(Error::Connection { .. })));
}

#[test]
fn bind_port_in_use_fails() {
    let (_server, port) = listening_server();

    let second = ServerSocket::bind(port).and_then(|socket| socket.listen());
    assert!(second.is_err());
}

#[test]
fn addresses_match_on_both_ends() {
    let (server, port) = listening_server();
    let client = Socket::connect("127.0.0.1", port).expect("connect");
    let accepted = server.accept().expect("accept");

    assert_eq!(
        client.local_addr().expect("client local"),
        accepted.peer_addr().expect("accepted peer")
    );
    assert_eq!(client.peer_addr().expect("client peer").port(), port);
}

#[test]
fn datagram_round_trip() {
    let receiver = DatagramSocket::bind(0).expect("bind");
    let port = receiver.local_addr().expect("local addr").port();

    let sender = DatagramSocket::connect("127.0.0.1", port).expect("connect");
    assert_eq!(sender.send(b"hello").expect("send"), 5);

    let mut buf = [0u8; 64];
    let (n, from) = receiver
        .receive_timeout(&mut buf, Duration::from_secs(5))
        .expect("receive")
        .expect("datagram arrived");
    assert_eq!(&buf[..n], b"hello");

    receiver.send_to(b"back", &from).expect("send_to");
    let n = sender.receive(&mut buf).expect("receive reply");
    assert_eq!(&buf[..n], b"back");
    assert_eq!(sender.peer_addr().expect("peer").port(), port);
}

#[test]
fn datagram_receive_timeout() {
    let socket = DatagramSocket::bind(0).expect("bind");
    let mut buf = [0u8; 8];

    let received = socket
        .receive_timeout(&mut buf, Duration::from_millis(20))
        .expect("receive_timeout");
    assert!(received.is_none());
}

#[test]
fn network_guard_keeps_environment_up() {
    let first = net::init().expect("init");
    let second = net::init().expect("init again");
    assert!(net::env::is_initialized());

    drop(first);
    assert!(net::env::is_initialized());
    drop(second);
}
