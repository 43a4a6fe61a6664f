//! Route matcher and dispatcher
//!
//! Request paths are matched against a static, ordered list of
//! segment templates like `/{remote}/{package}/{version}`. A template
//! matches when segment counts are equal and every compiled segment
//! accepts its (percent-unescaped) input; named segments capture the
//! literal value. The scan is deliberately linear: the route count is
//! small and fixed, first full match wins.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use regex::Regex;

use gitreg_core::error::Result;

/// Handler identity for a matched route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `GET /{remote}` - liveness probe
    Liveness,
    /// `GET /{remote}/-/all` - abbreviated catalog
    AllPackages,
    /// `GET /{remote}/{package}` - packument
    Packument,
    /// `GET /{remote}/{package}/{version}` - version document
    VersionDoc,
    /// `GET /{remote}/-/v1/search` - search
    Search,
    /// `GET /{remote}/{package}/{version}/download.{format}` - tarball
    Download,
}

/// Named captures extracted from a matched path
pub type PathParams = HashMap<String, String>;

/// One compiled path segment: literal text with optional `{name}`
/// placeholders, each matching any non-empty string
#[derive(Debug)]
struct SegmentMatcher {
    regex: Regex,
    names: Vec<String>,
}

impl SegmentMatcher {
    fn compile(segment: &str) -> Result<Self> {
        // After regex-escaping the literal text, placeholders appear
        // as `\{name\}` (both braces escaped); swap each for a
        // capture group.
        let placeholder = Regex::new(r"\\\{(\w*)\\\}")?;
        let escaped = regex::escape(segment);

        let mut names = Vec::new();
        let pattern = placeholder.replace_all(&escaped, |caps: &regex::Captures<'_>| {
            names.push(caps[1].to_string());
            "(.+)".to_string()
        });
        let regex = Regex::new(&format!("^{}$", pattern))?;
        Ok(Self { regex, names })
    }

    fn matches(&self, input: &str, params: &mut PathParams) -> bool {
        match self.regex.captures(input) {
            Some(caps) => {
                for (i, name) in self.names.iter().enumerate() {
                    params.insert(name.clone(), caps[i + 1].to_string());
                }
                true
            }
            None => false,
        }
    }
}

/// A full path template, compiled segment by segment
#[derive(Debug)]
pub struct RouteTemplate {
    raw: String,
    segments: Vec<SegmentMatcher>,
}

impl RouteTemplate {
    /// Compile a template such as `/{remote}/{package}/{version}`
    pub fn new(template: &str) -> Result<Self> {
        let segments = template
            .split('/')
            .filter(|s| !s.is_empty())
            .map(SegmentMatcher::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    /// The source template
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Match pre-split, unescaped path segments; a full match yields
    /// the named captures
    fn match_segments(&self, segments: &[String]) -> Option<PathParams> {
        if segments.len() != self.segments.len() {
            return None;
        }
        let mut params = PathParams::new();
        for (matcher, input) in self.segments.iter().zip(segments) {
            if !matcher.matches(input, &mut params) {
                return None;
            }
        }
        Some(params)
    }
}

/// Ordered route table; first full match dispatches
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<(RouteTemplate, Route)>,
}

impl RouteTable {
    /// The registry's route set, in registration order
    ///
    /// Order matters: the literal `-` catalog and search routes must
    /// precede the package templates that would also match them.
    pub fn registry() -> Result<Self> {
        Self::build([
            ("/{remote}", Route::Liveness),
            ("/{remote}/-/all", Route::AllPackages),
            ("/{remote}/{package}", Route::Packument),
            ("/{remote}/-/v1/search", Route::Search),
            ("/{remote}/{package}/{version}", Route::VersionDoc),
            (
                "/{remote}/{package}/{version}/download.{format}",
                Route::Download,
            ),
        ])
    }

    fn build<'a>(templates: impl IntoIterator<Item = (&'a str, Route)>) -> Result<Self> {
        let routes = templates
            .into_iter()
            .map(|(template, route)| Ok((RouteTemplate::new(template)?, route)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { routes })
    }

    /// Resolve a request path to a route and its path parameters
    pub fn dispatch(&self, path: &str) -> Option<(Route, PathParams)> {
        let segments = split_unescaped(path)?;
        for (template, route) in &self.routes {
            if let Some(params) = template.match_segments(&segments) {
                tracing::debug!(path, template = template.raw(), "route matched");
                return Some((*route, params));
            }
        }
        None
    }
}

/// Split a path on `/`, dropping empty segments and percent-unescaping
/// each one; undecodable input matches nothing
fn split_unescaped(path: &str) -> Option<Vec<String>> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            percent_decode_str(s)
                .decode_utf8()
                .ok()
                .map(|cow| cow.into_owned())
        })
        .collect()
}
