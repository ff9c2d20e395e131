//! Built-in JSON-LD codec.
//!
//! Reads the subset of JSON-LD that LDP servers emit for containers and
//! small resources: inline `@context` maps (terms, prefixes, `@vocab`,
//! `"@type": "@id"` coercion), `@id`, `@type`, `@graph`, value objects,
//! nested nodes, arrays and native JSON literals. Remote contexts are not
//! fetched.
//!
//! Writes graphs as N-Triples, which every type in the Turtle/N3/N-Quads
//! family accepts, or as flattened expanded JSON-LD.

use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;
use serde_json::{Map, Value};
use url::Url;

use crate::graph::{
    CodecError, DocumentCodec, Graph, RDF_LANG_STRING, RDF_TYPE, Term, Triple, XSD_BOOLEAN, XSD_DOUBLE,
    XSD_INTEGER, XSD_STRING, essence,
};

pub const JSON_LD: &str = "application/ld+json";

/// Types written as N-Triples. Each is a syntactic superset of N-Triples.
pub const N_TRIPLES_TYPES: &[&str] = &[
    "text/turtle",
    "application/n-triples",
    "text/n3",
    "application/n3",
    "application/x-turtle",
    "application/n-quads",
    "application/nquads",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLdCodec;

#[async_trait]
impl DocumentCodec for JsonLdCodec {
    async fn parse(&self, body: &[u8], graph: &mut Graph, base: &Url, content_type: &str) -> Result<(), CodecError> {
        let ct = essence(content_type);
        if ct != JSON_LD && ct != "application/json" {
            return Err(CodecError::UnsupportedType(ct));
        }

        let value: Value = serde_json::from_slice(body).map_err(|e| CodecError::Malformed(e.to_string()))?;
        let before = graph.len();
        Reader::new(base, graph).document(&value, &Context::default())?;
        tracing::trace!(base = %base, triples = graph.len() - before, "parsed json-ld");
        Ok(())
    }

    async fn serialize(&self, graph: &Graph, _base: &Url, content_type: &str) -> Result<Vec<u8>, CodecError> {
        let ct = essence(content_type);
        if N_TRIPLES_TYPES.contains(&ct.as_str()) {
            Ok(write_n_triples(graph))
        } else if ct == JSON_LD {
            write_json_ld(graph)
        } else {
            Err(CodecError::UnsupportedType(ct))
        }
    }

    fn output_types(&self) -> Vec<String> {
        let mut types = vec![N_TRIPLES_TYPES[0].to_string(), JSON_LD.to_string()];
        types.extend(N_TRIPLES_TYPES[1..].iter().map(|t| t.to_string()));
        types
    }
}

#[derive(Debug, Clone)]
struct TermDef {
    iri: String,
    /// `"@type": "@id"`: string values are IRIs, not literals.
    id_valued: bool,
}

/// Active context: term definitions and the default vocabulary.
#[derive(Debug, Clone, Default)]
struct Context {
    vocab: Option<String>,
    terms: HashMap<String, TermDef>,
}

impl Context {
    fn extend(&mut self, value: &Value) {
        match value {
            Value::Null => *self = Context::default(),
            Value::Array(items) => items.iter().for_each(|item| self.extend(item)),
            Value::String(url) => tracing::debug!(url = %url, "remote context not fetched"),
            Value::Object(map) => {
                for (key, def) in map {
                    match (key.as_str(), def) {
                        ("@vocab", Value::String(vocab)) => self.vocab = Some(vocab.clone()),
                        ("@vocab", Value::Null) => self.vocab = None,
                        (k, _) if k.starts_with('@') => {}
                        (k, Value::Null) => {
                            self.terms.remove(k);
                        }
                        (k, Value::String(iri)) => {
                            self.terms.insert(
                                k.to_string(),
                                TermDef {
                                    iri: iri.clone(),
                                    id_valued: false,
                                },
                            );
                        }
                        (k, Value::Object(def)) => {
                            let iri = match def.get("@id") {
                                Some(Value::String(iri)) => iri.clone(),
                                _ => k.to_string(),
                            };
                            let id_valued = matches!(def.get("@type"), Some(Value::String(t)) if t == "@id");
                            self.terms.insert(k.to_string(), TermDef { iri, id_valued });
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    /// Expand a property name or `@type` value.
    fn expand_vocab(&self, key: &str) -> Option<String> {
        let target = self.terms.get(key).map_or(key, |def| def.iri.as_str());
        self.expand_prefixed(target).or_else(|| self.from_vocab(target))
    }

    /// Expand an `@id` value; relative references resolve against `base`.
    fn expand_id(&self, value: &str, base: &Url) -> Option<String> {
        if let Some(iri) = self.expand_prefixed(value) {
            return Some(iri);
        }
        base.join(value).ok().map(String::from)
    }

    fn id_valued(&self, key: &str) -> bool {
        self.terms.get(key).is_some_and(|def| def.id_valued)
    }

    /// `prefix:suffix` with a known prefix, or an absolute IRI as-is.
    fn expand_prefixed(&self, value: &str) -> Option<String> {
        let (prefix, suffix) = value.split_once(':')?;
        if !suffix.starts_with("//")
            && let Some(def) = self.terms.get(prefix)
        {
            return Some(format!("{}{suffix}", def.iri));
        }
        Url::parse(value).is_ok().then(|| value.to_string())
    }

    fn from_vocab(&self, key: &str) -> Option<String> {
        self.vocab.as_ref().map(|vocab| format!("{vocab}{key}"))
    }
}

/// Walks one document into a graph.
struct Reader<'a> {
    base: &'a Url,
    graph: &'a mut Graph,
    /// Blank-node label prefix, unique to this document's base.
    scope: String,
    fresh: usize,
}

impl<'a> Reader<'a> {
    fn new(base: &'a Url, graph: &'a mut Graph) -> Self {
        let mut hasher = DefaultHasher::new();
        base.as_str().hash(&mut hasher);
        Reader {
            base,
            graph,
            scope: format!("b{:016x}", hasher.finish()),
            fresh: 0,
        }
    }

    fn document(&mut self, value: &Value, ctx: &Context) -> Result<(), CodecError> {
        match value {
            Value::Array(items) => items.iter().try_for_each(|item| self.document(item, ctx)),
            Value::Object(map) if map.keys().all(|k| k == "@context" || k == "@graph") => {
                let mut ctx = ctx.clone();
                if let Some(local) = map.get("@context") {
                    ctx.extend(local);
                }
                match map.get("@graph") {
                    Some(graph) => self.graph_items(graph, &ctx),
                    None => Ok(()),
                }
            }
            Value::Object(map) => self.node(map, ctx).map(drop),
            other => Err(CodecError::Malformed(format!(
                "expected a JSON-LD object or array, found {}",
                kind(other)
            ))),
        }
    }

    fn graph_items(&mut self, value: &Value, ctx: &Context) -> Result<(), CodecError> {
        for item in many(value) {
            match item {
                Value::Object(map) => {
                    self.node(map, ctx)?;
                }
                Value::Array(_) => self.graph_items(item, ctx)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Emit a node's triples and return its subject.
    fn node(&mut self, map: &Map<String, Value>, ctx: &Context) -> Result<Term, CodecError> {
        let mut ctx = ctx.clone();
        if let Some(local) = map.get("@context") {
            ctx.extend(local);
        }

        let subject = match map.get("@id") {
            Some(Value::String(id)) => self.reference(id, &ctx)?,
            Some(other) => {
                return Err(CodecError::Malformed(format!("@id must be a string, found {}", kind(other))));
            }
            None => self.fresh_blank(),
        };

        for (key, value) in map {
            match key.as_str() {
                "@id" | "@context" => {}
                // Named graphs are flattened into the default graph.
                "@graph" => self.graph_items(value, &ctx)?,
                "@type" => {
                    for ty in many(value) {
                        let Value::String(ty) = ty else {
                            return Err(CodecError::Malformed("@type values must be strings".into()));
                        };
                        let Some(iri) = ctx.expand_vocab(ty).or_else(|| ctx.expand_id(ty, self.base)) else {
                            continue;
                        };
                        self.graph
                            .insert(Triple::new(subject.clone(), Term::iri(RDF_TYPE), Term::Iri(iri)));
                    }
                }
                k if k.starts_with('@') => tracing::trace!(keyword = k, "keyword ignored"),
                k => {
                    let Some(predicate) = ctx.expand_vocab(k) else {
                        tracing::trace!(term = k, "undefined term dropped");
                        continue;
                    };
                    let id_valued = ctx.id_valued(k);
                    for object in self.objects(value, &ctx, id_valued)? {
                        self.graph
                            .insert(Triple::new(subject.clone(), Term::Iri(predicate.clone()), object));
                    }
                }
            }
        }

        Ok(subject)
    }

    fn objects(&mut self, value: &Value, ctx: &Context, id_valued: bool) -> Result<Vec<Term>, CodecError> {
        let term = match value {
            Value::Null => return Ok(Vec::new()),
            Value::Array(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.objects(item, ctx, id_valued)?);
                }
                return Ok(out);
            }
            Value::Bool(b) => Term::typed(b.to_string(), XSD_BOOLEAN),
            Value::Number(n) if n.is_i64() || n.is_u64() => Term::typed(n.to_string(), XSD_INTEGER),
            Value::Number(n) => Term::typed(n.to_string(), XSD_DOUBLE),
            Value::String(s) if id_valued => self.reference(s, ctx)?,
            Value::String(s) => Term::string(s.as_str()),
            Value::Object(map) => {
                if let Some(v) = map.get("@value") {
                    return Ok(self.literal(v, map, ctx).into_iter().collect());
                }
                if let Some(items) = map.get("@list").or_else(|| map.get("@set")) {
                    return self.objects(items, ctx, id_valued);
                }
                self.node(map, ctx)?
            }
        };
        Ok(vec![term])
    }

    fn literal(&self, value: &Value, map: &Map<String, Value>, ctx: &Context) -> Option<Term> {
        let (lexical, default_type) = match value {
            Value::String(s) => (s.clone(), XSD_STRING),
            Value::Bool(b) => (b.to_string(), XSD_BOOLEAN),
            Value::Number(n) if n.is_i64() || n.is_u64() => (n.to_string(), XSD_INTEGER),
            Value::Number(n) => (n.to_string(), XSD_DOUBLE),
            _ => return None,
        };

        if let Some(Value::String(lang)) = map.get("@language") {
            return Some(Term::Literal {
                value: lexical,
                datatype: RDF_LANG_STRING.to_string(),
                language: Some(lang.to_ascii_lowercase()),
            });
        }

        let datatype = match map.get("@type") {
            Some(Value::String(ty)) => ctx
                .expand_vocab(ty)
                .or_else(|| ctx.expand_id(ty, self.base))
                .unwrap_or_else(|| default_type.to_string()),
            _ => default_type.to_string(),
        };
        Some(Term::typed(lexical, datatype))
    }

    fn reference(&mut self, id: &str, ctx: &Context) -> Result<Term, CodecError> {
        if let Some(label) = id.strip_prefix("_:") {
            return Ok(Term::Blank(format!("{}l{}", self.scope, sanitize(label))));
        }
        ctx.expand_id(id, self.base)
            .map(Term::Iri)
            .ok_or_else(|| CodecError::Malformed(format!("cannot resolve @id {id:?} against {}", self.base)))
    }

    fn fresh_blank(&mut self) -> Term {
        let term = Term::Blank(format!("{}n{}", self.scope, self.fresh));
        self.fresh += 1;
        term
    }
}

fn many(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Blank labels must stay within `[A-Za-z0-9_-]` for N-Triples.
fn sanitize(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push_str(&format!("x{:x}", c as u32));
        }
    }
    out
}

fn write_n_triples(graph: &Graph) -> Vec<u8> {
    let mut out = String::new();
    for triple in graph.iter() {
        out.push_str(&triple.to_string());
        out.push('\n');
    }
    out.into_bytes()
}

fn write_json_ld(graph: &Graph) -> Result<Vec<u8>, CodecError> {
    let mut nodes: BTreeMap<&Term, Map<String, Value>> = BTreeMap::new();

    for triple in graph.iter() {
        let node = nodes.entry(&triple.subject).or_insert_with(|| {
            let mut node = Map::new();
            node.insert("@id".into(), Value::String(node_id(&triple.subject)));
            node
        });

        let (key, value) = match (&triple.predicate, &triple.object) {
            (Term::Iri(p), Term::Iri(o)) if p == RDF_TYPE => ("@type".to_string(), Value::String(o.clone())),
            (predicate, object) => (node_id(predicate), json_object(object)),
        };
        if let Value::Array(values) = node.entry(key).or_insert_with(|| Value::Array(Vec::new())) {
            values.push(value);
        }
    }

    let doc = Value::Array(nodes.into_values().map(Value::Object).collect());
    serde_json::to_vec_pretty(&doc).map_err(|e| CodecError::Serialize(e.to_string()))
}

fn node_id(term: &Term) -> String {
    match term {
        Term::Iri(iri) => iri.clone(),
        Term::Blank(label) => format!("_:{label}"),
        Term::Literal { value, .. } => value.clone(),
    }
}

fn json_object(term: &Term) -> Value {
    let mut obj = Map::new();
    match term {
        Term::Iri(_) | Term::Blank(_) => {
            obj.insert("@id".into(), Value::String(node_id(term)));
        }
        Term::Literal {
            value,
            datatype,
            language,
        } => {
            obj.insert("@value".into(), Value::String(value.clone()));
            if let Some(lang) = language {
                obj.insert("@language".into(), Value::String(lang.clone()));
            } else if datatype != XSD_STRING {
                obj.insert("@type".into(), Value::String(datatype.clone()));
            }
        }
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LDP: &str = "http://www.w3.org/ns/ldp#";

    async fn parse(doc: &str, base: &str) -> Graph {
        let mut graph = Graph::new();
        JsonLdCodec
            .parse(doc.as_bytes(), &mut graph, &Url::parse(base).unwrap(), JSON_LD)
            .await
            .unwrap();
        graph
    }

    fn has(graph: &Graph, s: Term, p: &str, o: Term) -> bool {
        graph.contains(&Triple::new(s, Term::iri(p), o))
    }

    #[tokio::test]
    async fn test_container_listing() {
        let doc = r#"{
            "@context": {
                "ldp": "http://www.w3.org/ns/ldp#",
                "contains": { "@id": "ldp:contains", "@type": "@id" }
            },
            "@id": "",
            "@type": ["ldp:BasicContainer", "ldp:Container"],
            "contains": ["x.ttl", "sub/", "http://other.example/y"]
        }"#;
        let g = parse(doc, "https://pod.example/a/").await;
        let dir = Term::iri("https://pod.example/a/");

        assert!(has(&g, dir.clone(), RDF_TYPE, Term::iri(format!("{LDP}BasicContainer"))));
        assert!(has(&g, dir.clone(), &format!("{LDP}contains"), Term::iri("https://pod.example/a/x.ttl")));
        assert!(has(&g, dir.clone(), &format!("{LDP}contains"), Term::iri("https://pod.example/a/sub/")));
        assert!(has(&g, dir, &format!("{LDP}contains"), Term::iri("http://other.example/y")));
        assert_eq!(g.len(), 5);
    }

    #[tokio::test]
    async fn test_expanded_form_and_graph() {
        let doc = r#"[{
            "@graph": [{
                "@id": "https://pod.example/a/",
                "http://www.w3.org/ns/ldp#contains": [{ "@id": "https://pod.example/a/x" }]
            }]
        }]"#;
        let g = parse(doc, "https://pod.example/a/").await;
        assert!(has(
            &g,
            Term::iri("https://pod.example/a/"),
            &format!("{LDP}contains"),
            Term::iri("https://pod.example/a/x")
        ));
    }

    #[tokio::test]
    async fn test_vocab_and_literals() {
        let doc = r##"{
            "@context": { "@vocab": "http://schema.org/" },
            "@id": "#me",
            "name": "Ada",
            "age": 36,
            "height": 1.7,
            "alive": false,
            "nick": { "@value": "ada", "@language": "EN" },
            "born": { "@value": "1815-12-10", "@type": "http://www.w3.org/2001/XMLSchema#date" },
            "@nope": "ignored"
        }"##;
        let g = parse(doc, "https://pod.example/card").await;
        let me = Term::iri("https://pod.example/card#me");

        assert!(has(&g, me.clone(), "http://schema.org/name", Term::string("Ada")));
        assert!(has(&g, me.clone(), "http://schema.org/age", Term::typed("36", XSD_INTEGER)));
        assert!(has(&g, me.clone(), "http://schema.org/height", Term::typed("1.7", XSD_DOUBLE)));
        assert!(has(&g, me.clone(), "http://schema.org/alive", Term::typed("false", XSD_BOOLEAN)));
        assert!(has(
            &g,
            me.clone(),
            "http://schema.org/nick",
            Term::Literal {
                value: "ada".into(),
                datatype: RDF_LANG_STRING.into(),
                language: Some("en".into()),
            }
        ));
        assert!(has(
            &g,
            me,
            "http://schema.org/born",
            Term::typed("1815-12-10", "http://www.w3.org/2001/XMLSchema#date")
        ));
        assert_eq!(g.len(), 6);
    }

    #[tokio::test]
    async fn test_undefined_terms_are_dropped() {
        let g = parse(r#"{ "@id": "x", "title": "no vocab" }"#, "https://pod.example/").await;
        assert!(g.is_empty());
    }

    #[tokio::test]
    async fn test_nested_nodes_become_blank_nodes() {
        let doc = r#"{
            "@context": { "s": "http://schema.org/" },
            "@id": "https://pod.example/a",
            "s:address": { "s:city": "Paris" }
        }"#;
        let g = parse(doc, "https://pod.example/a").await;
        assert_eq!(g.len(), 2);

        let address = g
            .objects(&Term::iri("https://pod.example/a"), &Term::iri("http://schema.org/address"))
            .next()
            .cloned()
            .unwrap();
        assert!(matches!(address, Term::Blank(_)));
        assert!(has(&g, address, "http://schema.org/city", Term::string("Paris")));
    }

    #[tokio::test]
    async fn test_blank_labels_are_scoped_per_document() {
        let doc = r#"{ "@id": "_:n", "http://x/p": { "@id": "_:m" } }"#;

        let a1 = parse(doc, "https://pod.example/a").await;
        let a2 = parse(doc, "https://pod.example/a").await;
        let b = parse(doc, "https://pod.example/b").await;
        assert_eq!(a1, a2);

        let mut merged = a1.clone();
        merged.merge(b);
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let base = Url::parse("https://pod.example/").unwrap();
        let mut graph = Graph::new();

        let err = JsonLdCodec
            .parse(b"{ nope", &mut graph, &base, JSON_LD)
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));

        let err = JsonLdCodec.parse(b"42", &mut graph, &base, JSON_LD).await.unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));

        let err = JsonLdCodec.parse(b"{}", &mut graph, &base, "text/turtle").await.unwrap_err();
        assert_eq!(err, CodecError::UnsupportedType("text/turtle".into()));
    }

    #[tokio::test]
    async fn test_writes_n_triples() {
        let g: Graph = [
            Triple::new(Term::iri("http://x/b"), Term::iri("http://x/p"), Term::string("2")),
            Triple::new(Term::iri("http://x/a"), Term::iri("http://x/p"), Term::iri("http://x/o")),
        ]
        .into_iter()
        .collect();
        let base = Url::parse("http://x/").unwrap();

        let out = JsonLdCodec
            .serialize(&g, &base, "text/turtle; charset=utf-8")
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<http://x/a> <http://x/p> <http://x/o> .\n<http://x/b> <http://x/p> \"2\" .\n"
        );
    }

    #[tokio::test]
    async fn test_json_ld_output_reads_back() {
        let g: Graph = [
            Triple::new(Term::iri("http://x/a"), Term::iri(RDF_TYPE), Term::iri("http://x/T")),
            Triple::new(Term::iri("http://x/a"), Term::iri("http://x/p"), Term::iri("http://x/o")),
            Triple::new(Term::iri("http://x/a"), Term::iri("http://x/q"), Term::typed("1", XSD_INTEGER)),
        ]
        .into_iter()
        .collect();
        let base = Url::parse("http://x/").unwrap();

        let out = JsonLdCodec.serialize(&g, &base, JSON_LD).await.unwrap();
        let mut back = Graph::new();
        JsonLdCodec.parse(&out, &mut back, &base, JSON_LD).await.unwrap();
        assert_eq!(back, g);
    }

    #[tokio::test]
    async fn test_unsupported_output() {
        let base = Url::parse("http://x/").unwrap();
        let err = JsonLdCodec
            .serialize(&Graph::new(), &base, "application/rdf+xml")
            .await
            .unwrap_err();
        assert_eq!(err, CodecError::UnsupportedType("application/rdf+xml".into()));
    }

    #[test]
    fn test_output_types_prefer_turtle() {
        let types = JsonLdCodec.output_types();
        assert_eq!(types[0], "text/turtle");
        assert_eq!(types[1], JSON_LD);
        assert_eq!(types.len(), N_TRIPLES_TYPES.len() + 1);
    }
}
