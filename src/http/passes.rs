//! Request and response shaping passes.
//!
//! # Responsibilities
//! - Request side (before transmission): bodiless-method framing fixup and
//!   the per-relay upstream deadline
//! - Response side: an ordered, short-circuiting pipeline run before any
//!   response header is written back to the client
//!
//! # Design Decisions
//! - Passes return a tagged [`PassOutcome`] instead of a bare bool, making
//!   the short-circuit contract explicit and testable in isolation
//! - The pipeline is the only response-shaping structure; relays never
//!   hardcode individual transforms

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use axum::http::header::{
    HeaderValue, CONNECTION, CONTENT_LENGTH, SET_COOKIE, TRANSFER_ENCODING,
};
use axum::http::{request, response, Method, Version};
use regex::Regex;

use crate::http::options::ForwardOptions;

/// Outcome of a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Keep running subsequent passes.
    Continue,
    /// The response is fully handled; skip the remaining passes.
    Handled,
}

/// Sets `content-length: 0` on bodiless unsafe-method requests.
///
/// DELETE and OPTIONS requests without a declared length would otherwise be
/// ambiguously framed upstream; any `transfer-encoding` is dropped with it.
pub fn delete_length(head: &mut request::Parts) -> PassOutcome {
    if (head.method == Method::DELETE || head.method == Method::OPTIONS)
        && !head.headers.contains_key(CONTENT_LENGTH)
    {
        head.headers
            .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        head.headers.remove(TRANSFER_ENCODING);
    }
    PassOutcome::Continue
}

/// The timeout pass: surfaces the configured per-relay upstream deadline.
pub fn upstream_deadline(options: &ForwardOptions) -> Option<Duration> {
    options.upstream_timeout
}

/// One step of the response-shaping pipeline.
pub trait ResponsePass: Send + Sync {
    /// Pass name, used in trace output.
    fn name(&self) -> &'static str;

    /// Inspect or modify the upstream response before it is re-emitted.
    fn apply(
        &self,
        request: &request::Parts,
        response: &mut response::Parts,
        options: &ForwardOptions,
    ) -> PassOutcome;
}

/// Ordered response-transform steps; the first pass reporting
/// [`PassOutcome::Handled`] short-circuits the rest.
pub struct ResponsePassPipeline {
    passes: Vec<Box<dyn ResponsePass>>,
}

impl ResponsePassPipeline {
    /// The built-in pipeline, in order.
    pub fn standard() -> Self {
        Self {
            passes: vec![
                Box::new(RemoveChunked),
                Box::new(SetConnection),
                Box::new(RewriteCookieDomain),
            ],
        }
    }

    /// Append an additional pass after the built-in ones.
    pub fn push(&mut self, pass: Box<dyn ResponsePass>) {
        self.passes.push(pass);
    }

    /// Run the pipeline over one upstream response.
    pub fn run(
        &self,
        request: &request::Parts,
        response: &mut response::Parts,
        options: &ForwardOptions,
    ) {
        for pass in &self.passes {
            if pass.apply(request, response, options) == PassOutcome::Handled {
                tracing::trace!(pass = pass.name(), "response handled, skipping remaining passes");
                break;
            }
        }
    }
}

impl Default for ResponsePassPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// HTTP/1.0 clients cannot interpret chunked framing; strip the header and
/// let the transport re-frame the body.
struct RemoveChunked;

impl ResponsePass for RemoveChunked {
    fn name(&self) -> &'static str {
        "remove-chunked"
    }

    fn apply(
        &self,
        request: &request::Parts,
        response: &mut response::Parts,
        _options: &ForwardOptions,
    ) -> PassOutcome {
        if request.version == Version::HTTP_10 {
            response.headers.remove(TRANSFER_ENCODING);
        }
        PassOutcome::Continue
    }
}

/// Completes a missing `connection` header from the request, defaulting to
/// `keep-alive`.
struct SetConnection;

impl ResponsePass for SetConnection {
    fn name(&self) -> &'static str {
        "set-connection"
    }

    fn apply(
        &self,
        request: &request::Parts,
        response: &mut response::Parts,
        _options: &ForwardOptions,
    ) -> PassOutcome {
        if !response.headers.contains_key(CONNECTION) {
            let value = request
                .headers
                .get(CONNECTION)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("keep-alive"));
            response.headers.insert(CONNECTION, value);
        }
        PassOutcome::Continue
    }
}

/// Rewrites or strips the `domain=` attribute of every `set-cookie` header
/// according to the configured table.
struct RewriteCookieDomain;

impl ResponsePass for RewriteCookieDomain {
    fn name(&self) -> &'static str {
        "rewrite-cookie-domain"
    }

    fn apply(
        &self,
        _request: &request::Parts,
        response: &mut response::Parts,
        options: &ForwardOptions,
    ) -> PassOutcome {
        let Some(table) = &options.cookie_domain_rewrite else {
            return PassOutcome::Continue;
        };
        if !response.headers.contains_key(SET_COOKIE) {
            return PassOutcome::Continue;
        }

        let rewritten: Vec<HeaderValue> = response
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| match value.to_str() {
                Ok(cookie) => HeaderValue::from_str(&rewrite_cookie_domain(cookie, table))
                    .unwrap_or_else(|_| value.clone()),
                // Opaque bytes stay untouched.
                Err(_) => value.clone(),
            })
            .collect();

        response.headers.remove(SET_COOKIE);
        for value in rewritten {
            response.headers.append(SET_COOKIE, value);
        }
        PassOutcome::Continue
    }
}

fn cookie_domain_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(;\s*domain=)([^;]+)").expect("cookie domain pattern is valid")
    })
}

/// Rewrite the first `domain=` attribute of one cookie header.
///
/// Lookup is by exact previous-domain string, with `"*"` as the wildcard
/// entry; an empty replacement removes the attribute; no match leaves the
/// header unchanged.
pub fn rewrite_cookie_domain(header: &str, table: &HashMap<String, String>) -> String {
    cookie_domain_pattern()
        .replace(header, |caps: &regex::Captures<'_>| {
            match table.get(&caps[2]).or_else(|| table.get("*")) {
                None => caps[0].to_string(),
                Some(replacement) if replacement.is_empty() => String::new(),
                Some(replacement) => format!("{}{}", &caps[1], replacement),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, Response};

    fn request_parts(builder: axum::http::request::Builder) -> request::Parts {
        builder
            .body(Body::empty())
            .expect("test request")
            .into_parts()
            .0
    }

    fn response_parts(builder: axum::http::response::Builder) -> response::Parts {
        builder
            .body(Body::empty())
            .expect("test response")
            .into_parts()
            .0
    }

    #[test]
    fn delete_without_length_gets_zero() {
        let mut parts = request_parts(
            Request::builder()
                .method(Method::DELETE)
                .header(TRANSFER_ENCODING, "chunked"),
        );

        delete_length(&mut parts);

        assert_eq!(parts.headers.get(CONTENT_LENGTH).unwrap(), "0");
        assert!(parts.headers.get(TRANSFER_ENCODING).is_none());
    }

    #[test]
    fn options_without_length_gets_zero() {
        let mut parts = request_parts(Request::builder().method(Method::OPTIONS));
        delete_length(&mut parts);
        assert_eq!(parts.headers.get(CONTENT_LENGTH).unwrap(), "0");
    }

    #[test]
    fn delete_with_length_is_untouched() {
        let mut parts = request_parts(
            Request::builder()
                .method(Method::DELETE)
                .header(CONTENT_LENGTH, "12"),
        );
        delete_length(&mut parts);
        assert_eq!(parts.headers.get(CONTENT_LENGTH).unwrap(), "12");
    }

    #[test]
    fn other_methods_are_untouched() {
        let mut parts = request_parts(Request::builder().method(Method::GET));
        delete_length(&mut parts);
        assert!(parts.headers.get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn chunked_stripped_for_http_10_requests() {
        let request = request_parts(Request::builder().version(Version::HTTP_10));
        let mut response =
            response_parts(Response::builder().header(TRANSFER_ENCODING, "chunked"));

        RemoveChunked.apply(&request, &mut response, &ForwardOptions::default());

        assert!(response.headers.get(TRANSFER_ENCODING).is_none());
    }

    #[test]
    fn chunked_kept_for_http_11_requests() {
        let request = request_parts(Request::builder().version(Version::HTTP_11));
        let mut response =
            response_parts(Response::builder().header(TRANSFER_ENCODING, "chunked"));

        RemoveChunked.apply(&request, &mut response, &ForwardOptions::default());

        assert_eq!(response.headers.get(TRANSFER_ENCODING).unwrap(), "chunked");
    }

    #[test]
    fn missing_connection_copied_from_request() {
        let request = request_parts(Request::builder().header(CONNECTION, "close"));
        let mut response = response_parts(Response::builder());

        SetConnection.apply(&request, &mut response, &ForwardOptions::default());

        assert_eq!(response.headers.get(CONNECTION).unwrap(), "close");
    }

    #[test]
    fn missing_connection_defaults_to_keep_alive() {
        let request = request_parts(Request::builder());
        let mut response = response_parts(Response::builder());

        SetConnection.apply(&request, &mut response, &ForwardOptions::default());

        assert_eq!(response.headers.get(CONNECTION).unwrap(), "keep-alive");
    }

    #[test]
    fn existing_connection_is_untouched() {
        let request = request_parts(Request::builder().header(CONNECTION, "close"));
        let mut response = response_parts(Response::builder().header(CONNECTION, "upgrade"));

        SetConnection.apply(&request, &mut response, &ForwardOptions::default());

        assert_eq!(response.headers.get(CONNECTION).unwrap(), "upgrade");
    }

    fn table(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn cookie_domain_rewritten_by_exact_match() {
        let table = table(&[("a.com", "b.com"), ("*", "c.com")]);
        assert_eq!(
            rewrite_cookie_domain("sid=1; Domain=a.com; Path=/", &table),
            "sid=1; Domain=b.com; Path=/"
        );
    }

    #[test]
    fn cookie_domain_rewritten_by_wildcard() {
        let table = table(&[("a.com", "b.com"), ("*", "c.com")]);
        assert_eq!(
            rewrite_cookie_domain("sid=1; Domain=x.com; Path=/", &table),
            "sid=1; Domain=c.com; Path=/"
        );
    }

    #[test]
    fn empty_replacement_strips_the_attribute() {
        let table = table(&[("a.com", "")]);
        assert_eq!(
            rewrite_cookie_domain("sid=1; Domain=a.com; Path=/", &table),
            "sid=1; Path=/"
        );
    }

    #[test]
    fn unmatched_domain_is_unchanged() {
        let table = table(&[("a.com", "b.com")]);
        assert_eq!(
            rewrite_cookie_domain("sid=1; Domain=x.com", &table),
            "sid=1; Domain=x.com"
        );
    }

    #[test]
    fn cookie_without_domain_is_unchanged() {
        let table = table(&[("a.com", "")]);
        assert_eq!(rewrite_cookie_domain("sid=1; Path=/", &table), "sid=1; Path=/");
    }

    #[test]
    fn every_set_cookie_instance_rewritten_independently() {
        let mut config = crate::config::schema::ForwardConfig::default();
        config.cookie_domain_rewrite = table(&[("a.com", "b.com"), ("*", "c.com")]);
        let options = ForwardOptions::from_config(&config).unwrap();

        let request = request_parts(Request::builder());
        let mut response = response_parts(
            Response::builder()
                .header(SET_COOKIE, "one=1; Domain=a.com")
                .header(SET_COOKIE, "two=2; Domain=x.com")
                .header(SET_COOKIE, "three=3"),
        );

        RewriteCookieDomain.apply(&request, &mut response, &options);

        let cookies: Vec<&str> = response
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(
            cookies,
            vec!["one=1; Domain=b.com", "two=2; Domain=c.com", "three=3"]
        );
    }

    struct Claim;

    impl ResponsePass for Claim {
        fn name(&self) -> &'static str {
            "claim"
        }

        fn apply(
            &self,
            _request: &request::Parts,
            response: &mut response::Parts,
            _options: &ForwardOptions,
        ) -> PassOutcome {
            response
                .headers
                .insert("x-claimed", HeaderValue::from_static("yes"));
            PassOutcome::Handled
        }
    }

    struct MustNotRun;

    impl ResponsePass for MustNotRun {
        fn name(&self) -> &'static str {
            "must-not-run"
        }

        fn apply(
            &self,
            _request: &request::Parts,
            response: &mut response::Parts,
            _options: &ForwardOptions,
        ) -> PassOutcome {
            response
                .headers
                .insert("x-must-not-run", HeaderValue::from_static("yes"));
            PassOutcome::Continue
        }
    }

    #[test]
    fn handled_short_circuits_the_pipeline() {
        let mut pipeline = ResponsePassPipeline::standard();
        pipeline.push(Box::new(Claim));
        pipeline.push(Box::new(MustNotRun));

        let request = request_parts(Request::builder());
        let mut response = response_parts(Response::builder());

        pipeline.run(&request, &mut response, &ForwardOptions::default());

        assert_eq!(response.headers.get("x-claimed").unwrap(), "yes");
        assert!(response.headers.get("x-must-not-run").is_none());
    }
}
