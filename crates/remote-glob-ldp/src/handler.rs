//! Request entry point: glob URL in, combined RDF document out.

use http::header::ACCEPT;
use http::{Request, Response};
use remote_glob::path::{self, ROOT};
use remote_glob::{FsError, Pattern, RemoteFs, RemoteGlob, TraversalError, contains_glob};
use thiserror::Error;
use url::Url;

use crate::combine::{CombinationError, combine_for_response};
use crate::config::ResolverConfig;
use crate::graph::DocumentCodec;
use crate::listing::LdpFs;
use crate::negotiate::preferred_media_type;
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("request URI must be absolute: {0}")]
    InvalidUri(String),
    #[error(transparent)]
    Traversal(#[from] TraversalError),
    #[error("listing {path}: {source}")]
    Listing {
        path: String,
        #[source]
        source: FsError,
    },
    #[error(transparent)]
    Combination(#[from] CombinationError),
}

/// Answers glob requests against the server their URL points at.
///
/// A request for `https://pod.example/data/*/card` lists `/data/` on that
/// server, keeps the members that have a `card`, fetches each match and
/// returns their union as one document.
pub struct Resolver<T, C> {
    transport: T,
    codec: C,
    config: ResolverConfig,
}

impl<T: Transport, C: DocumentCodec> Resolver<T, C> {
    pub fn new(transport: T, codec: C) -> Self {
        Self {
            transport,
            codec,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// True if the request path has glob magic. Other requests are left to
    /// the caller.
    pub fn handles<B>(&self, request: &Request<B>) -> bool {
        contains_glob(request.uri().path())
    }

    /// The output type to answer `request` with, if any is acceptable.
    pub fn negotiate<B>(&self, request: &Request<B>) -> Option<String> {
        let accept: Vec<&str> = request
            .headers()
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let accept = (!accept.is_empty()).then(|| accept.join(", "));
        preferred_media_type(accept.as_deref(), &self.config.output_types)
    }

    /// Expand the request path and combine every match.
    ///
    /// Returns `Ok(None)` for requests without glob magic. An unacceptable
    /// `Accept` header is answered, not raised: the response carries the
    /// configured refusal status and an empty body.
    #[tracing::instrument(level = "debug", skip(self, request), fields(uri = %request.uri()), err)]
    pub async fn resolve<B>(&self, request: &Request<B>) -> Result<Option<Response<Vec<u8>>>, ResolveError> {
        if !self.handles(request) {
            return Ok(None);
        }
        let Some(output_type) = self.negotiate(request) else {
            return Ok(Some(self.not_acceptable()));
        };

        let url = request_url(request)?;
        let origin = origin_of(&url)?;
        let pattern = Pattern::parse(url.path()).map_err(TraversalError::from)?;

        let matches = self.expand(&origin, &pattern).await?;
        let names: Vec<String> = matches.iter().map(|m| path::relative(m).to_string()).collect();
        tracing::debug!(matches = names.len(), output_type = %output_type, "pattern resolved");

        self.respond(&names, &origin, &output_type).await.map(Some)
    }

    /// Prefix mode: `/dir/abc*` lists `/dir/` once and keeps members whose
    /// name starts with `abc`, ignoring case. No deeper traversal.
    ///
    /// Returns `Ok(None)` unless the path ends in `*`.
    #[tracing::instrument(level = "debug", skip(self, request), fields(uri = %request.uri()), err)]
    pub async fn resolve_prefix<B>(&self, request: &Request<B>) -> Result<Option<Response<Vec<u8>>>, ResolveError> {
        if !request.uri().path().ends_with('*') {
            return Ok(None);
        }
        let Some(output_type) = self.negotiate(request) else {
            return Ok(Some(self.not_acceptable()));
        };

        let url = request_url(request)?;
        let origin = origin_of(&url)?;
        let stem = url.path().trim_end_matches('*');
        let (dir, prefix) = stem.rsplit_once('/').unwrap_or(("", stem));
        let dir = path::normalize(dir);
        let prefix = prefix.to_lowercase();

        let entries = match self.fs(&origin).list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(source) => return Err(ResolveError::Listing { path: dir, source }),
        };
        let names: Vec<String> = entries
            .iter()
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .map(|name| path::relative(&path::join(&dir, name)).to_string())
            .collect();
        tracing::debug!(listed = entries.len(), matches = names.len(), "prefix resolved");

        self.respond(&names, &origin, &output_type).await.map(Some)
    }

    /// Absolute paths on `origin` that match `pattern`.
    pub async fn expand(&self, origin: &Url, pattern: &Pattern) -> Result<Vec<String>, TraversalError> {
        let fs = self.fs(origin);
        RemoteGlob::new(&fs)
            .with_options(self.config.glob_options())
            .expand(pattern, ROOT)
            .await
    }

    fn fs(&self, origin: &Url) -> LdpFs<'_, T, C> {
        LdpFs::new(&self.transport, &self.codec, origin.clone()).with_listing_type(self.config.listing_type.as_str())
    }

    async fn respond(&self, names: &[String], origin: &Url, output_type: &str) -> Result<Response<Vec<u8>>, ResolveError> {
        let response = combine_for_response(
            names,
            origin,
            output_type,
            &self.transport,
            &self.codec,
            &self.config.fetch_type,
        )
        .await?;
        Ok(response)
    }

    fn not_acceptable(&self) -> Response<Vec<u8>> {
        let mut response = Response::new(Vec::new());
        *response.status_mut() = self.config.not_acceptable();
        response
    }
}

fn request_url<B>(request: &Request<B>) -> Result<Url, ResolveError> {
    let uri = request.uri().to_string();
    Url::parse(&uri).map_err(|e| ResolveError::InvalidUri(format!("{uri}: {e}")))
}

/// Scheme, host and port, with a `/` path.
fn origin_of(url: &Url) -> Result<Url, ResolveError> {
    url.join(ROOT)
        .map_err(|e| ResolveError::InvalidUri(format!("{url}: {e}")))
}
