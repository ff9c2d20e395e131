//! Fetch matched documents and merge them into one response body.

use futures::future::try_join_all;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Response, StatusCode};
use thiserror::Error;
use url::Url;

use crate::graph::{CodecError, DocumentCodec, Graph};
use crate::transport::{Transport, TransportError, is_absent, request};

/// Errors that abort a combination. Partial results are discarded.
#[derive(Debug, Clone, Error)]
pub enum CombinationError {
    #[error("cannot resolve {name:?} against {base}: {message}")]
    InvalidName { name: String, base: String, message: String },
    #[error("fetching {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("fetching {url}: unexpected status {status}")]
    Status { url: String, status: StatusCode },
    #[error("parsing {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: CodecError,
    },
    #[error("serializing combined graph: {0}")]
    Serialize(#[source] CodecError),
    #[error("invalid response header: {0}")]
    Header(String),
}

/// Fetch every name under `base`, merge the results and serialize them as
/// `output_type`.
///
/// Names resolve relative to `base`, whose path is treated as a directory
/// even without a trailing `/`. A name is always a path below it, even one
/// like `note:1` that would otherwise parse as a URL of its own. Fetches run
/// concurrently. A 4xx response drops that name; any other failure aborts
/// the whole combination.
#[tracing::instrument(level = "debug", skip(names, transport, codec), fields(names = names.len()), err)]
pub async fn combine<T, C>(
    names: &[String],
    base: &Url,
    output_type: &str,
    transport: &T,
    codec: &C,
    fetch_type: &str,
) -> Result<Vec<u8>, CombinationError>
where
    T: Transport + ?Sized,
    C: DocumentCodec + ?Sized,
{
    let dir = directory(base);
    let urls = names
        .iter()
        .map(|name| {
            dir.join(&format!("./{name}")).map_err(|e| CombinationError::InvalidName {
                name: name.clone(),
                base: dir.to_string(),
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let graphs = try_join_all(urls.iter().map(|url| fetch(url, transport, codec, fetch_type))).await?;

    let mut merged = Graph::new();
    let mut fetched = 0;
    for graph in graphs.into_iter().flatten() {
        fetched += 1;
        merged.merge(graph);
    }
    tracing::debug!(fetched, triples = merged.len(), "combined");

    codec
        .serialize(&merged, base, output_type)
        .await
        .map_err(CombinationError::Serialize)
}

/// [`combine`], wrapped in a 200 response carrying `output_type`.
pub async fn combine_for_response<T, C>(
    names: &[String],
    base: &Url,
    output_type: &str,
    transport: &T,
    codec: &C,
    fetch_type: &str,
) -> Result<Response<Vec<u8>>, CombinationError>
where
    T: Transport + ?Sized,
    C: DocumentCodec + ?Sized,
{
    let content_type = HeaderValue::from_str(output_type).map_err(|e| CombinationError::Header(e.to_string()))?;
    let body = combine(names, base, output_type, transport, codec, fetch_type).await?;

    let mut response = Response::new(body);
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    Ok(response)
}

/// `base` with a path ending in `/`.
fn directory(base: &Url) -> Url {
    let mut dir = base.clone();
    if !dir.path().ends_with('/') {
        let path = format!("{}/", dir.path());
        dir.set_path(&path);
    }
    dir
}

/// One document as its own graph, `None` if the server says it is absent.
async fn fetch<T, C>(url: &Url, transport: &T, codec: &C, fetch_type: &str) -> Result<Option<Graph>, CombinationError>
where
    T: Transport + ?Sized,
    C: DocumentCodec + ?Sized,
{
    let fetch_err = |source| CombinationError::Fetch {
        url: url.to_string(),
        source,
    };

    let req = request(Method::GET, url, fetch_type).map_err(fetch_err)?;
    let resp = transport.send(req).await.map_err(fetch_err)?;

    let status = resp.status();
    if is_absent(status) {
        tracing::debug!(url = %url, %status, "skipping absent document");
        return Ok(None);
    }
    if !status.is_success() {
        return Err(CombinationError::Status {
            url: url.to_string(),
            status,
        });
    }

    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(fetch_type)
        .to_string();

    let mut graph = Graph::new();
    codec
        .parse(resp.body(), &mut graph, url, &content_type)
        .await
        .map_err(|source| CombinationError::Parse {
            url: url.to_string(),
            source,
        })?;
    Ok(Some(graph))
}
