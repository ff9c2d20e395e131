//! remote-glob-ldp: Glob URLs over Linked Data Platform servers.
//!
//! Provides:
//! - **negotiate**: `Accept` header ranking against the types we can write
//! - **LdpFs**: `RemoteFs` over LDP containers (`ldp:contains` listings,
//!   `Link` header probes)
//! - **combine**: Concurrent fetch of every match, merged into one graph
//! - **Resolver**: The request entry point tying the three together
//!
//! Transport and document handling are seams: bring a [`Transport`] that
//! performs HTTP exchanges and a [`DocumentCodec`] for your RDF syntaxes
//! ([`JsonLdCodec`] covers JSON-LD in and N-Triples or JSON-LD out).

pub mod combine;
pub mod config;
pub mod graph;
mod handler;
pub mod jsonld;
pub mod listing;
pub mod negotiate;
pub mod transport;

pub use combine::{CombinationError, combine, combine_for_response};
pub use config::ResolverConfig;
pub use graph::{CodecError, DocumentCodec, Graph, Term, Triple};
pub use handler::{ResolveError, Resolver};
pub use jsonld::JsonLdCodec;
pub use listing::{LdpFs, parse_link_header};
pub use negotiate::{accepted_media_types, preferred_media_type, preferred_media_types};
pub use transport::{Transport, TransportError, is_absent};

