//! `RemoteFs` over a Linked Data Platform server.
//!
//! A directory is an LDP container: listing it means fetching its
//! representation and reading the `ldp:contains` members. Probing is a
//! `HEAD` whose `Link: <...ldp#BasicContainer>; rel="type"` header tells
//! containers from plain resources.

use async_trait::async_trait;
use http::header::LINK;
use http::{HeaderMap, Method, StatusCode};
use remote_glob::{FsError, Probe, RemoteFs};
use url::Url;

use crate::graph::{DocumentCodec, Graph, Term};
use crate::jsonld::JSON_LD;
use crate::transport::{Transport, is_absent, request};

pub const LDP: &str = "http://www.w3.org/ns/ldp#";
pub const LDP_CONTAINS: &str = "http://www.w3.org/ns/ldp#contains";

const CONTAINER_TYPES: &[&str] = &[
    "http://www.w3.org/ns/ldp#BasicContainer",
    "http://www.w3.org/ns/ldp#Container",
    "http://www.w3.org/ns/ldp#DirectContainer",
    "http://www.w3.org/ns/ldp#IndirectContainer",
];

/// One link-value of a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub target: String,
    /// Lowercased relation types; `rel="a b"` yields two.
    pub rels: Vec<String>,
}

impl Link {
    pub fn has_rel(&self, rel: &str) -> bool {
        self.rels.iter().any(|r| r.eq_ignore_ascii_case(rel))
    }
}

/// Parse a `Link` header value (RFC 8288). Malformed link-values are skipped.
///
/// ```
/// use remote_glob_ldp::listing::parse_link_header;
///
/// let links = parse_link_header(r#"<http://www.w3.org/ns/ldp#BasicContainer>; rel="type", <.acl>; rel=acl"#);
/// assert_eq!(links.len(), 2);
/// assert!(links[0].has_rel("type"));
/// assert_eq!(links[1].target, ".acl");
/// ```
pub fn parse_link_header(value: &str) -> Vec<Link> {
    split_links(value)
        .iter()
        .filter_map(|part| {
            let part = part.trim();
            let rest = part.strip_prefix('<')?;
            let (target, params) = rest.split_once('>')?;

            let mut rels = Vec::new();
            for param in params.split(';') {
                let Some((key, val)) = param.split_once('=') else {
                    continue;
                };
                if key.trim().eq_ignore_ascii_case("rel") {
                    let val = val.trim().trim_matches('"');
                    rels.extend(val.split_whitespace().map(str::to_ascii_lowercase));
                }
            }

            Some(Link {
                target: target.trim().to_string(),
                rels,
            })
        })
        .collect()
}

/// Split on commas outside `<...>` and quoted strings.
fn split_links(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_target = false;
    let mut quoted = false;

    for c in value.chars() {
        match c {
            '<' if !quoted => in_target = true,
            '>' if !quoted => in_target = false,
            '"' if !in_target => quoted = !quoted,
            ',' if !in_target && !quoted => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);
    parts
}

/// Whether the `Link` headers declare an LDP container type.
///
/// `None` when they declare no `rel="type"` at all.
pub fn declares_container(headers: &HeaderMap) -> Option<bool> {
    let types: Vec<Link> = headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(parse_link_header)
        .filter(|link| link.has_rel("type"))
        .collect();

    if types.is_empty() {
        return None;
    }
    Some(types.iter().any(|link| CONTAINER_TYPES.contains(&link.target.as_str())))
}

/// The last non-empty path segment of an IRI.
fn member_name(iri: &str) -> Option<String> {
    let url = Url::parse(iri).ok()?;
    url.path_segments()?.rfind(|s| !s.is_empty()).map(str::to_string)
}

/// LDP-backed remote namespace rooted at `origin`.
///
/// Paths are percent-encoded URL paths; member names come back in the same
/// encoding.
pub struct LdpFs<'a, T: ?Sized, C: ?Sized> {
    transport: &'a T,
    codec: &'a C,
    origin: Url,
    listing_type: String,
}

impl<'a, T: Transport + ?Sized, C: DocumentCodec + ?Sized> LdpFs<'a, T, C> {
    pub fn new(transport: &'a T, codec: &'a C, origin: Url) -> Self {
        Self {
            transport,
            codec,
            origin,
            listing_type: JSON_LD.to_string(),
        }
    }

    /// Media type requested for container listings.
    pub fn with_listing_type(mut self, listing_type: impl Into<String>) -> Self {
        self.listing_type = listing_type.into();
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// The URL of `path`, with a trailing `/` when it names a container.
    pub fn url_for(&self, path: &str, container: bool) -> Result<Url, FsError> {
        let mut relative = path.trim_start_matches('/').to_string();
        if container && !relative.is_empty() && !relative.ends_with('/') {
            relative.push('/');
        }
        self.origin
            .join(&format!("./{relative}"))
            .map_err(|e| FsError::Malformed(format!("bad path {path}: {e}")))
    }
}

#[async_trait]
impl<T: Transport + ?Sized, C: DocumentCodec + ?Sized> RemoteFs for LdpFs<'_, T, C> {
    #[tracing::instrument(level = "trace", skip(self), err)]
    async fn list(&self, path: &str) -> Result<Vec<String>, FsError> {
        let url = self.url_for(path, true)?;
        let req = request(Method::GET, &url, &self.listing_type).map_err(|e| FsError::Transport(e.to_string()))?;
        let resp = self
            .transport
            .send(req)
            .await
            .map_err(|e| FsError::Transport(e.to_string()))?;

        let status = resp.status();
        if is_absent(status) {
            return Err(FsError::NotFound(format!("{status} listing {url}")));
        }
        if !status.is_success() {
            return Err(FsError::Transport(format!("{status} listing {url}")));
        }
        if declares_container(resp.headers()) == Some(false) {
            tracing::trace!(url = %url, "not a container");
            return Ok(Vec::new());
        }

        let content_type = resp
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(self.listing_type.as_str())
            .to_string();

        let mut graph = Graph::new();
        self.codec
            .parse(resp.body(), &mut graph, &url, &content_type)
            .await
            .map_err(|e| FsError::Malformed(format!("{url}: {e}")))?;

        let container = Term::iri(url.as_str());
        let unslashed = Term::iri(url.as_str().trim_end_matches('/'));
        let contains = Term::iri(LDP_CONTAINS);

        let mut names: Vec<String> = Vec::new();
        for member in graph
            .objects(&container, &contains)
            .chain(graph.objects(&unslashed, &contains))
        {
            let Some(name) = member.as_iri().and_then(member_name) else {
                continue;
            };
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }

    #[tracing::instrument(level = "trace", skip(self), err)]
    async fn probe(&self, path: &str) -> Result<Probe, FsError> {
        let url = self.url_for(path, false)?;
        let req = request(Method::HEAD, &url, &self.listing_type).map_err(|e| FsError::Transport(e.to_string()))?;
        let resp = self
            .transport
            .send(req)
            .await
            .map_err(|e| FsError::Transport(e.to_string()))?;

        let status: StatusCode = resp.status();
        if is_absent(status) {
            return Ok(Probe::Absent);
        }
        if !status.is_success() {
            return Err(FsError::Transport(format!("{status} probing {url}")));
        }

        Ok(match declares_container(resp.headers()) {
            Some(true) => Probe::Directory,
            _ => Probe::File,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonld::JsonLdCodec;
    use crate::transport::TransportError;
    use http::{HeaderValue, Request, Response};
    use std::sync::Mutex;

    /// Answers every request with one canned response and records requests.
    struct Canned {
        status: u16,
        link: Option<&'static str>,
        body: &'static str,
        seen: Mutex<Vec<(Method, String, String)>>,
    }

    impl Canned {
        fn new(status: u16, link: Option<&'static str>, body: &'static str) -> Self {
            Self {
                status,
                link,
                body,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: Request<()>) -> Result<Response<Vec<u8>>, TransportError> {
            let accept = request.headers()[http::header::ACCEPT].to_str().unwrap().to_string();
            self.seen
                .lock()
                .unwrap()
                .push((request.method().clone(), request.uri().to_string(), accept));

            let mut resp = Response::new(self.body.as_bytes().to_vec());
            *resp.status_mut() = StatusCode::from_u16(self.status).unwrap();
            if let Some(link) = self.link {
                resp.headers_mut().insert(LINK, HeaderValue::from_static(link));
            }
            Ok(resp)
        }
    }

    const CONTAINER_LINK: &str = r#"<http://www.w3.org/ns/ldp#BasicContainer>; rel="type""#;

    const LISTING: &str = r#"{
        "@context": { "ldp": "http://www.w3.org/ns/ldp#" },
        "@id": "https://pod.example/a/",
        "ldp:contains": [
            { "@id": "https://pod.example/a/x.ttl" },
            { "@id": "https://pod.example/a/sub/" },
            { "@id": "https://pod.example/a/my%20file" }
        ]
    }"#;

    fn origin() -> Url {
        Url::parse("https://pod.example/").unwrap()
    }

    #[test]
    fn test_link_header_parsing() {
        let links = parse_link_header(
            r#"<http://www.w3.org/ns/ldp#Resource>; rel="type", <http://x/a,b>; rel="TYPE describedby", junk"#,
        );
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "http://www.w3.org/ns/ldp#Resource");
        assert_eq!(links[1].target, "http://x/a,b");
        assert_eq!(links[1].rels, vec!["type", "describedby"]);
    }

    #[test]
    fn test_declares_container() {
        let mut headers = HeaderMap::new();
        assert_eq!(declares_container(&headers), None);

        headers.append(LINK, HeaderValue::from_static(r#"<.acl>; rel="acl""#));
        assert_eq!(declares_container(&headers), None);

        headers.append(LINK, HeaderValue::from_static(r#"<http://www.w3.org/ns/ldp#Resource>; rel="type""#));
        assert_eq!(declares_container(&headers), Some(false));

        headers.append(LINK, HeaderValue::from_static(CONTAINER_LINK));
        assert_eq!(declares_container(&headers), Some(true));
    }

    #[test]
    fn test_member_names() {
        assert_eq!(member_name("https://pod.example/a/x.ttl").as_deref(), Some("x.ttl"));
        assert_eq!(member_name("https://pod.example/a/sub/").as_deref(), Some("sub"));
        assert_eq!(member_name("https://pod.example/").as_deref(), None);
    }

    #[tokio::test]
    async fn test_lists_container_members() {
        let transport = Canned::new(200, Some(CONTAINER_LINK), LISTING);
        let fs = LdpFs::new(&transport, &JsonLdCodec, origin());

        let names = fs.list("/a").await.unwrap();
        assert_eq!(names, vec!["my%20file", "sub", "x.ttl"]);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0], (Method::GET, "https://pod.example/a/".to_string(), JSON_LD.to_string()));
    }

    #[tokio::test]
    async fn test_list_statuses() {
        let missing = Canned::new(404, None, "");
        let err = LdpFs::new(&missing, &JsonLdCodec, origin()).list("/a").await.unwrap_err();
        assert!(err.is_not_found());

        let forbidden = Canned::new(403, None, "");
        let err = LdpFs::new(&forbidden, &JsonLdCodec, origin()).list("/a").await.unwrap_err();
        assert!(err.is_not_found());

        let broken = Canned::new(500, None, "");
        let err = LdpFs::new(&broken, &JsonLdCodec, origin()).list("/a").await.unwrap_err();
        assert!(matches!(err, FsError::Transport(_)));
    }

    #[tokio::test]
    async fn test_non_container_lists_empty() {
        let transport = Canned::new(200, Some(r#"<http://www.w3.org/ns/ldp#Resource>; rel="type""#), LISTING);
        let fs = LdpFs::new(&transport, &JsonLdCodec, origin());
        assert!(fs.list("/a/x.ttl").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_listing_is_malformed() {
        let transport = Canned::new(200, Some(CONTAINER_LINK), "<not json>");
        let fs = LdpFs::new(&transport, &JsonLdCodec, origin());
        assert!(matches!(fs.list("/a").await, Err(FsError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_probe() {
        let dir = Canned::new(200, Some(CONTAINER_LINK), "");
        let fs = LdpFs::new(&dir, &JsonLdCodec, origin()).with_listing_type("text/turtle");
        assert_eq!(fs.probe("/a/sub").await.unwrap(), Probe::Directory);
        assert_eq!(
            dir.seen.lock().unwrap()[0],
            (Method::HEAD, "https://pod.example/a/sub".to_string(), "text/turtle".to_string())
        );

        let file = Canned::new(200, None, "");
        assert_eq!(LdpFs::new(&file, &JsonLdCodec, origin()).probe("/a/x").await.unwrap(), Probe::File);

        let gone = Canned::new(410, None, "");
        assert_eq!(LdpFs::new(&gone, &JsonLdCodec, origin()).probe("/a/x").await.unwrap(), Probe::Absent);

        let down = Canned::new(503, None, "");
        assert!(LdpFs::new(&down, &JsonLdCodec, origin()).probe("/a/x").await.is_err());
    }

    #[test]
    fn test_urls() {
        let t = Canned::new(200, None, "");
        let fs = LdpFs::new(&t, &JsonLdCodec, Url::parse("https://pod.example/").unwrap());
        assert_eq!(fs.url_for("/", true).unwrap().as_str(), "https://pod.example/");
        assert_eq!(fs.url_for("/a/b", true).unwrap().as_str(), "https://pod.example/a/b/");
        assert_eq!(fs.url_for("/a/b", false).unwrap().as_str(), "https://pod.example/a/b");
        assert_eq!(fs.url_for("/note:1", false).unwrap().as_str(), "https://pod.example/note:1");
        assert_eq!(fs.url_for("/mailto:x/y", true).unwrap().as_str(), "https://pod.example/mailto:x/y/");
    }
}
