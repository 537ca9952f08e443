//! Pipelined messages on one connection: bytes of the next message
//! arriving inside a read belonging to the previous one.

use peck::{Context, Error, Parser, ParserConfig};

fn ctx() -> Context {
    let mut ctx = Context::new();
    ctx.install_parser_service(ParserConfig::new());
    ctx
}

fn feed(p: &mut Parser, wire: &[u8]) {
    let mut fed = 0;
    while fed < wire.len() {
        let mut bufs = p.prepare().unwrap();
        let n = bufs.put(&wire[fed..]);
        assert!(n > 0);
        p.commit(n);
        fed += n;
    }
}

fn body(p: &Parser) -> Vec<u8> {
    let (a, b) = p.pull_body();
    let mut v = a.to_vec();
    v.extend_from_slice(b);
    v
}

const TWO: &[u8] = b"POST /one HTTP/1.1\r\nContent-Length: 5\r\n\r\nfirstPOST /two HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n6\r\nsecond\r\n0\r\n\r\n";

#[test]
fn two_requests_in_one_burst() {
    let ctx = ctx();
    let mut p = Parser::request(&ctx);
    p.start();
    feed(&mut p, TWO);

    p.parse().unwrap();
    assert_eq!(p.request_view().unwrap().target(), "/one");
    assert_eq!(body(&p), b"first");

    p.start();
    p.parse().unwrap();
    assert_eq!(p.request_view().unwrap().target(), "/two");
    assert_eq!(body(&p), b"second");
}

#[test]
fn split_at_every_byte() {
    let ctx = ctx();
    for split in 1..TWO.len() {
        let mut p = Parser::request(&ctx);
        p.start();
        feed(&mut p, &TWO[..split]);

        let mut targets = Vec::new();
        let mut bodies = Vec::new();
        let mut second_fed = false;
        loop {
            match p.parse() {
                Ok(()) => {
                    targets.push(p.request_view().unwrap().target().to_string());
                    bodies.push(body(&p));
                    if targets.len() == 2 {
                        break;
                    }
                    p.start();
                }
                Err(Error::NeedData) => {
                    assert!(!second_fed, "split {}: parser stuck", split);
                    feed(&mut p, &TWO[split..]);
                    second_fed = true;
                }
                Err(e) => panic!("split {}: {:?}", split, e),
            }
        }
        assert_eq!(targets, ["/one", "/two"], "split {}", split);
        assert_eq!(bodies[0], b"first", "split {}", split);
        assert_eq!(bodies[1], b"second", "split {}", split);
    }
}

#[test]
fn eof_after_first_message() {
    let ctx = ctx();
    let mut p = Parser::request(&ctx);
    p.start();
    feed(&mut p, b"GET /only HTTP/1.1\r\n\r\n");
    p.commit_eof();
    p.parse().unwrap();
    assert_eq!(p.request_view().unwrap().target(), "/only");

    p.start();
    assert_eq!(p.parse(), Err(Error::EndOfStream));
}
