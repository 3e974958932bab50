//! Human-readable renderings of traffic for trace logs.

use std::fmt::Write;

use crate::http::{Headers, Request, Response};

const HEX_ROW: usize = 32;

/// Upper-case hex, 32 bytes per row.
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for row in bytes.chunks(HEX_ROW) {
        for (i, b) in row.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{:02X}", b);
        }
        out.push('\n');
    }
    out
}

pub fn request(req: &Request) -> String {
    let mut out = format!("{} {} {}\n", req.method, req.uri, req.version);
    write_headers(&mut out, &req.headers);
    write_body(&mut out, &req.body, req.content.is_text);
    out
}

pub fn response(res: &Response) -> String {
    let mut out = format!("{} {} {}\n", res.version, res.status_code, res.reason_phrase);
    write_headers(&mut out, &res.headers);
    write_body(&mut out, &res.body, res.content.is_text);
    out
}

fn write_headers(out: &mut String, headers: &Headers) {
    for header in headers.iter() {
        let _ = writeln!(out, "{}: {}", header.key, header.value);
    }
}

fn write_body(out: &mut String, body: &[u8], is_text: bool) {
    if body.is_empty() {
        return;
    }
    out.push('\n');
    if is_text {
        out.push_str(&String::from_utf8_lossy(body));
        out.push('\n');
    } else {
        out.push_str(&hex(body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{parse_request, parse_response};

    #[test]
    fn hex_rows_of_32() {
        assert_eq!(hex(b"HELLO"), "48 45 4C 4C 4F\n");

        let rendered = hex(&[0xAB; 40]);
        let rows: Vec<&str> = rendered.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].split(' ').count(), 32);
        assert_eq!(rows[1].split(' ').count(), 8);
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn text_request_dump() {
        let mut req = Request::new();
        parse_request(
            b"POST http://a.com/form HTTP/1.1\r\nHost: a.com\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nhi",
            &mut req,
        )
        .unwrap();

        assert_eq!(
            request(&req),
            "POST /form HTTP/1.1\nHost: a.com\nContent-Type: text/plain\nContent-Length: 2\n\nhi\n"
        );
    }

    #[test]
    fn binary_response_dump_uses_hex() {
        let mut res = Response::new();
        parse_response(
            b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 2\r\n\r\n\x89P",
            &mut res,
            Some("GET"),
        )
        .unwrap();

        assert!(response(&res).ends_with("\n\n89 50\n"));
    }
}
