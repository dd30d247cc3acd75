pub mod probe;
pub mod server;

pub use probe::{AvailabilityChecker, HttpAvailabilityChecker};
pub use server::{DescriptionServer, DeviceInfoPublisher};

/// Upper bound for the head of a request to the description server.
pub(crate) const MAX_REQUEST_HEAD: usize = 8192;

/// Outcome of parsing the bytes received so far.
#[derive(Debug)]
pub(crate) enum RequestHead {
    /// The end of the head has not been received yet.
    Incomplete,

    /// The head is complete but its request line is not valid HTTP.
    Malformed,

    Complete(http::Request<()>),
}

/// Parses the head (request line and headers) of an HTTP request.
///
/// Malformed header lines are skipped, a malformed request line makes the whole head malformed.
pub(crate) fn parse_request_head(data: &[u8]) -> RequestHead {
    let Some(end_of_head) = find_subsequence(data, b"\r\n\r\n") else {
        return RequestHead::Incomplete;
    };

    match parse_complete_head(&data[..(end_of_head + 2)]) {
        Some(request) => RequestHead::Complete(request),
        None => RequestHead::Malformed,
    }
}

/// Parses a head which is known to be complete, including the \r\n of its last line.
fn parse_complete_head(mut head: &[u8]) -> Option<http::Request<()>> {
    let mut request = http::Request::builder();
    let mut begin_found = false;

    while let Some(end_of_line) = find_subsequence(head, b"\r\n") {
        let line = &head[..end_of_line];
        head = &head[end_of_line + 2..];

        if line.is_empty() {
            continue;
        }

        if !begin_found {
            let mut parts = line.splitn(3, |c| *c == b' ');
            let http_method = parts.next()?;
            let uri = parts.next()?;
            let http_version = parts.next()?;

            let method = http::Method::from_bytes(http_method).ok()?;
            let uri = http::uri::Uri::try_from(uri).ok()?;
            let version = match trim_slice(http_version) {
                b"HTTP/1.0" => http::Version::HTTP_10,
                b"HTTP/1.1" => http::Version::HTTP_11,
                _ => return None,
            };

            request = request.method(method).uri(uri).version(version);
            begin_found = true;
        } else {
            let Some(colon_index) = find_subsequence(line, b":") else { continue; };
            let (name, value) = line.split_at(colon_index);

            let Ok(name) = http::header::HeaderName::from_bytes(trim_slice(name)) else { continue; };
            let Ok(value) = http::header::HeaderValue::from_bytes(trim_slice(&value[1..])) else { continue; };

            request = request.header(name, value);
        }
    }

    if !begin_found {
        return None;
    }

    request.body(()).ok()
}

/// Serializes the status line and headers of an HTTP response.
pub(crate) fn response_head_to_data(response: &http::Response<()>) -> Vec<u8> {
    let status = response.status();

    let mut data = Vec::new();
    data.extend_from_slice(match response.version() {
        http::Version::HTTP_10 => b"HTTP/1.0",
        _ => b"HTTP/1.1",
    });
    data.push(b' ');
    data.extend_from_slice(status.as_str().as_bytes());
    data.push(b' ');
    data.extend_from_slice(status.canonical_reason().unwrap_or("").as_bytes());
    data.extend_from_slice(b"\r\n");
    for (name, value) in response.headers() {
        data.extend_from_slice(name.as_str().as_bytes());
        data.extend_from_slice(b": ");
        data.extend_from_slice(value.as_bytes());
        data.extend_from_slice(b"\r\n");
    }
    data.extend_from_slice(b"\r\n");
    data
}

/// Extracts the device identifier from a request path, which is its final segment.
pub(crate) fn identifier_from_path(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|segment| !segment.is_empty())
}

/// Finds a subsequence in a byte slice.
pub(crate) fn find_subsequence<const SIZE: usize>(
    data: &[u8],
    sequence: &[u8; SIZE],
) -> Option<usize> {
    data.windows(SIZE).position(|window| window == sequence)
}

/// Trims leading and trailing whitespace from a slice.
fn trim_slice(input: &[u8]) -> &[u8] {
    let start_index = input
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .unwrap_or(input.len());
    let end_index = input
        .iter()
        .rposition(|c| !c.is_ascii_whitespace())
        .map_or(start_index, |i| i + 1);

    &input[start_index..end_index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_and_headers() {
        let data = b"GET /upnp/description/abc HTTP/1.1\r\nHost: 10.0.0.1:3333\r\nbroken line\r\nAccept:  text/xml \r\n\r\n";
        let RequestHead::Complete(request) = parse_request_head(data) else {
            panic!("expected a complete request");
        };

        assert_eq!(request.method(), http::Method::GET);
        assert_eq!(request.uri().path(), "/upnp/description/abc");
        assert_eq!(request.version(), http::Version::HTTP_11);
        assert_eq!(request.headers()["host"], "10.0.0.1:3333");
        assert_eq!(request.headers()["accept"], "text/xml");
    }

    #[test]
    fn incomplete_head_waits_for_more_data() {
        assert!(matches!(
            parse_request_head(b"GET /abc HTTP/1.1\r\nHost: x\r\n"),
            RequestHead::Incomplete
        ));
        assert!(matches!(parse_request_head(b"garbage"), RequestHead::Incomplete));
    }

    #[test]
    fn complete_garbage_is_malformed() {
        assert!(matches!(
            parse_request_head(b"garbage\r\n\r\n"),
            RequestHead::Malformed
        ));
        assert!(matches!(
            parse_request_head(b"GET /abc SPDY/9\r\n\r\n"),
            RequestHead::Malformed
        ));
        assert!(matches!(parse_request_head(b"\r\n\r\n"), RequestHead::Malformed));
    }

    #[test]
    fn identifier_is_last_path_segment() {
        assert_eq!(identifier_from_path("/upnp/description/abc"), Some("abc"));
        assert_eq!(identifier_from_path("/abc"), Some("abc"));
        assert_eq!(identifier_from_path("/upnp/description/"), None);
        assert_eq!(identifier_from_path("/"), None);
    }

    #[test]
    fn serializes_response_head() {
        let response = http::Response::builder()
            .status(http::StatusCode::OK)
            .header(http::header::CONTENT_LENGTH, 5)
            .body(())
            .unwrap();

        assert_eq!(
            response_head_to_data(&response),
            b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\n"
        );
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(trim_slice(b"  a b \t"), b"a b");
        assert_eq!(trim_slice(b"   "), b"");
        assert_eq!(trim_slice(b""), b"");
    }
}
