//! Serialize a message, feed the wire bytes back through the parser in
//! arbitrary chunk sizes, and compare what comes out.

use peck::{Context, Error, Headers, Parser, ParserConfig, Request, Response, Serializer, SerializerConfig};

fn ctx() -> Context {
    let mut ctx = Context::new();
    ctx.install_parser_service(ParserConfig::new());
    ctx.install_serializer_service(SerializerConfig::new());
    ctx
}

/// Drain an outgoing message completely.
fn serialize(out: &mut peck::Outgoing<'_>) -> Vec<u8> {
    let mut wire = Vec::new();
    while !out.is_done() {
        let bytes = match out.prepare() {
            Ok(p) => p.concat(),
            Err(Error::Expect100Continue) => continue,
            Err(e) => panic!("serialize: {:?}", e),
        };
        out.consume(bytes.len());
        wire.extend_from_slice(&bytes);
    }
    wire
}

/// Feed `wire` to the parser `step` bytes at a time, collecting the body
/// into an elastic buffer.
fn parse_elastic(p: &mut Parser, wire: &[u8], step: usize) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    let mut fed = 0;
    loop {
        match p.parse_elastic(&mut body) {
            Ok(()) => return Ok(body),
            Err(Error::NeedData) => {
                if fed >= wire.len() {
                    p.commit_eof();
                    continue;
                }
                let mut bufs = p.prepare()?;
                let n = bufs.put(&wire[fed..wire.len().min(fed + step)]);
                assert!(n > 0);
                p.commit(n);
                fed += n;
            }
            Err(e) => return Err(e),
        }
    }
}

#[test]
fn request_sized_round_trip() {
    let ctx = ctx();
    let mut req = Request::new();
    req.set_start_line(http::Method::POST, "/upload", http::Version::HTTP_11)
        .unwrap();
    req.append("Host", "example.com").unwrap();
    req.set_content_length(11).unwrap();

    let mut sr = Serializer::new(&ctx);
    let body: &[&[u8]] = &[b"hello", b" ", b"world"];
    let mut out = sr.start_buffers(&req, body).unwrap();
    let wire = serialize(&mut out);

    for step in [1, 2, 3, 7, wire.len()] {
        let mut p = Parser::request(&ctx);
        p.start();
        let got = parse_elastic(&mut p, &wire, step).unwrap();
        assert_eq!(got, b"hello world", "step {}", step);

        let view = p.request_view().unwrap();
        assert_eq!(view.method(), &http::Method::POST);
        assert_eq!(view.target(), "/upload");
        assert_eq!(view.get("host"), Some(&b"example.com"[..]));
        assert_eq!(view.get("content-length"), Some(&b"11"[..]));
    }
}

#[test]
fn response_chunked_round_trip() {
    let ctx = ctx();
    let mut res = Response::new();
    res.append("Server", "peck").unwrap();
    res.set_chunked(true).unwrap();

    let payload: Vec<u8> = (0..8192u32).flat_map(|i| i.to_le_bytes()).collect();

    for step in [1, 9, 1024, usize::MAX] {
        let mut sr = Serializer::new(&ctx);
        let mut src: &[u8] = &payload;
        let mut out = sr.start_source(&res, &mut src).unwrap();
        let wire = serialize(&mut out);

        let mut p = Parser::response(&ctx);
        p.start();
        let got = parse_elastic(&mut p, &wire, step.min(wire.len())).unwrap();
        assert_eq!(got, payload, "step {}", step);
        assert!(p.response_view().unwrap().metadata().transfer_encoding.is_chunked);
    }
}

#[test]
fn header_fields_survive_the_trip() {
    let ctx = ctx();
    let mut res = Response::new();
    res.set_start_line(http::StatusCode::CREATED, "Created", http::Version::HTTP_11)
        .unwrap();
    res.append("Location", "/things/42").unwrap();
    res.append("X-Many", "one").unwrap();
    res.append("X-Many", "two").unwrap();
    res.set_content_length(0).unwrap();

    let mut sr = Serializer::new(&ctx);
    let mut out = sr.start_empty(&res).unwrap();
    let wire = serialize(&mut out);

    let mut p = Parser::response(&ctx);
    p.start();
    parse_elastic(&mut p, &wire, 5).unwrap();

    let view = p.response_view().unwrap();
    assert_eq!(view.status(), http::StatusCode::CREATED);
    assert_eq!(view.reason(), "Created");
    let many: Vec<_> = view
        .iter()
        .filter(|f| f.name().eq_ignore_ascii_case("x-many"))
        .map(|f| f.value().to_vec())
        .collect();
    assert_eq!(many, [b"one".to_vec(), b"two".to_vec()]);
}

#[test]
fn serializer_output_is_byte_exact() {
    // the concrete scenario: POST /x with a five byte body
    let ctx = ctx();
    let mut req = Request::new();
    req.set_start_line(http::Method::POST, "/x", http::Version::HTTP_11)
        .unwrap();
    req.set_content_length(5).unwrap();

    let mut sr = Serializer::new(&ctx);
    let body: &[&[u8]] = &[b"hello"];
    let mut out = sr.start_buffers(&req, body).unwrap();
    let wire = serialize(&mut out);
    assert_eq!(wire, b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello" as &[u8]);

    let mut p = Parser::request(&ctx);
    p.start();
    let got = parse_elastic(&mut p, &wire, 4).unwrap();
    assert_eq!(got, b"hello");
    let view = p.request_view().unwrap();
    assert_eq!(view.method(), &http::Method::POST);
    assert_eq!(view.target(), "/x");
    assert_eq!(view.iter().count(), 1);
}

#[test]
fn to_eof_round_trip() {
    let ctx = ctx();
    // a response with no framing headers is read until close
    let res = Response::new();
    let mut sr = Serializer::new(&ctx);
    let mut src: &[u8] = b"unframed until the end";
    let mut out = sr.start_source(&res, &mut src).unwrap();
    let wire = serialize(&mut out);

    let mut p = Parser::response(&ctx);
    p.start();
    let got = parse_elastic(&mut p, &wire, 3).unwrap();
    assert_eq!(got, b"unframed until the end");
    assert!(!p.response_view().unwrap().keep_alive());
}
