use spindle::io::{AsyncReadable, AsyncStream, AsyncWritable, Offloaded};
use spindle::net::{Socket, SocketStream};
use spindle::{Error, Executors, MemoryStream, Readable, Stream, Writable, block_on};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

#[test]
fn memory_stream_reads_what_was_written() {
    let mut stream = MemoryStream::new();
    stream.write_str("hello ").expect("write");
    stream.write_all(b"world").expect("write");

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf, 2, 5).expect("read");
    assert_eq!(n, 5);
    assert_eq!(&buf[2..7], b"hello");
    assert_eq!(stream.remaining(), 6);

    assert_eq!(stream.read_string(64).expect("read_string"), " world");
    assert_eq!(stream.read_into(&mut buf).expect("read at end"), 0);
    assert_eq!(stream.as_bytes(), b"hello world");
}

#[test]
fn memory_stream_rejects_bad_range() {
    let mut stream = MemoryStream::from_bytes("abc");
    let mut buf = [0u8; 4];

    match stream.read(&mut buf, 3, 2) {
        Err(Error::Io(error)) => assert_eq!(error.kind(), ErrorKind::InvalidInput),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(stream.write(b"xy", 1, 5).is_err());
    assert_eq!(stream.remaining(), 3, "a rejected read consumes nothing");
}

#[test]
fn closed_memory_stream() {
    let mut stream = MemoryStream::from_bytes("abc");
    stream.close().expect("close");
    stream.close().expect("second close");

    assert!(stream.is_closed());
    assert!(matches!(stream.write_str("x"), Err(Error::Closed)));
    assert!(matches!(stream.read_string(3), Err(Error::Closed)));
}

#[test]
fn read_string_rejects_invalid_utf8() {
    let mut stream = MemoryStream::from_bytes(vec![0xff, 0xfe]);
    match stream.read_string(2) {
        Err(Error::Io(error)) => assert_eq!(error.kind(), ErrorKind::InvalidData),
        other => panic!("unexpected result: {other:?}"),
    }
}

fn connected_pair() -> (Socket, std::net::TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let port = listener.local_addr().expect("listener addr").port();

    let socket = Socket::connect("127.0.0.1", port).expect("connect");
    let (peer, _) = listener.accept().expect("accept");
    (socket, peer)
}

#[test]
fn socket_output_sends_only_when_buffer_fills() {
    let (socket, mut peer) = connected_pair();
    let (_input, mut output) = SocketStream::new(socket, 4).split();

    output.write_all(b"abc").expect("write");
    thread::sleep(Duration::from_millis(50));

    peer.set_nonblocking(true).expect("nonblocking");
    let mut buf = [0u8; 8];
    match peer.read(&mut buf) {
        Err(error) => assert_eq!(error.kind(), ErrorKind::WouldBlock),
        Ok(n) => panic!("{n} bytes left the buffer before it was full"),
    }
    peer.set_nonblocking(false).expect("blocking");

    output.write_all(b"d").expect("write");
    let mut first = [0u8; 4];
    peer.read_exact(&mut first).expect("full buffer was sent");
    assert_eq!(&first, b"abcd");

    output.write_all(b"ef").expect("write");
    output.flush().expect("flush");
    let mut rest = [0u8; 2];
    peer.read_exact(&mut rest).expect("flushed bytes");
    assert_eq!(&rest, b"ef");
}

#[test]
fn socket_input_reads_until_peer_closes() {
    let (socket, mut peer) = connected_pair();
    let (mut input, _output) = SocketStream::new(socket, 3).split();

    let writer = thread::spawn(move || {
        peer.write_all(b"one two three").expect("peer write");
    });

    let mut received = Vec::new();
    input.read_to_end(&mut received).expect("read to end");
    writer.join().expect("writer thread");

    assert_eq!(received, b"one two three");
    assert_eq!(input.read_string(8).expect("read after end"), "");
}

#[test]
fn close_flushes_and_half_closes() {
    let (socket, mut peer) = connected_pair();
    let mut stream = SocketStream::new(socket, 64);

    stream.write_str("bye").expect("write");
    stream.close().expect("close");
    assert!(stream.is_closed());
    assert!(matches!(stream.write_str("more"), Err(Error::Closed)));

    let mut received = String::new();
    peer.read_to_string(&mut received).expect("peer sees end of stream");
    assert_eq!(received, "bye");
}

#[test]
fn offloaded_stream_runs_on_executor() {
    let pool = Executors::new_fixed_thread_pool(2).expect("executor");
    let mut stream = Offloaded::new(MemoryStream::new(), pool.clone());

    let text = block_on(async {
        stream.write_str("offloaded").await?;
        stream.flush().await?;
        stream.read_string(64).await
    })
    .expect("offloaded round trip");
    assert_eq!(text, "offloaded");

    block_on(stream.close()).expect("close");
    assert!(AsyncStream::is_closed(&stream));

    let inner = stream.into_inner().expect("no operation in flight");
    assert!(inner.is_closed());
    pool.shutdown();
}

#[test]
fn short_transfer_reports_both_sizes() {
    let error = Error::ShortTransfer {
        expected: 10,
        actual: 4,
    };
    let message = error.to_string();

    assert!(message.contains("10"));
    assert!(message.contains('4'));
}
