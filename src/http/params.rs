//! Canonical request parameters.
//!
//! Route patterns alone cannot tell a scoped name's embedded slash
//! (`@scope/name`) from a path boundary, nor a pinned version (`8.4.1`) from
//! an alias token (`v8`). Every route therefore hands the raw request target
//! to [`normalize`], which derives the same parameter record no matter which
//! pattern matched.
//!
//! Grammar of the segment following the name:
//!
//! - version: `MAJOR.MINOR.PATCH`, numeric parts without leading zeros,
//!   optionally followed by `-prerelease` and/or `+build`
//! - alias: `v` followed by a major number, e.g. `v8`
//!
//! Anything else in that position is rejected as malformed.

use crate::error::{AssetwayError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Route-kind segment that starts every registry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Pkg,
    Npm,
    Map,
}

impl Kind {
    pub const ALL: [Kind; 3] = [Kind::Pkg, Kind::Npm, Kind::Map];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Pkg => "pkg",
            Kind::Npm => "npm",
            Kind::Map => "map",
        }
    }

    /// `pkg` and `npm` address the same package namespace.
    pub fn is_package(&self) -> bool {
        matches!(self, Kind::Pkg | Kind::Npm)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = AssetwayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pkg" => Ok(Kind::Pkg),
            "npm" => Ok(Kind::Npm),
            "map" => Ok(Kind::Map),
            other => Err(AssetwayError::malformed_path(format!(
                "unknown route kind '{}'",
                other
            ))),
        }
    }
}

/// Which parts of a reference a path carries. Used to pick the route-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// `/{kind}/[@scope/]name`
    Name,
    /// `/{kind}/[@scope/]name/{version}`
    Version,
    /// `/{kind}/[@scope/]name/{version}/*extras`
    VersionExtras,
    /// `/{kind}/[@scope/]name/v{alias}`
    Alias,
    /// `/{kind}/[@scope/]name/v{alias}/*extras`
    AliasExtras,
}

/// Parameters derived from a raw request path.
///
/// At most one of `version` and `alias` is set; `extras` never starts with a
/// slash and keeps the order of the original segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRequestParams {
    pub kind: Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<String>,
}

impl CanonicalRequestParams {
    pub fn shape(&self) -> Shape {
        match (&self.version, &self.alias, &self.extras) {
            (None, None, _) => Shape::Name,
            (Some(_), _, None) => Shape::Version,
            (Some(_), _, Some(_)) => Shape::VersionExtras,
            (None, Some(_), None) => Shape::Alias,
            (None, Some(_), Some(_)) => Shape::AliasExtras,
        }
    }

    /// Full package name, `@scope/name` or `name`.
    pub fn full_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{}/{}", scope, self.name),
            None => self.name.clone(),
        }
    }

    /// Path of the named resource, `/{kind}/[@scope/]name`.
    pub fn base_path(&self) -> String {
        let mut path = format!("/{}/", self.kind);
        if let Some(scope) = &self.scope {
            path.push('@');
            path.push_str(&urlencoding::encode(scope));
            path.push('/');
        }
        path.push_str(&urlencoding::encode(&self.name));
        path
    }

    /// Rebuild a request path that normalizes back to these parameters.
    pub fn to_path(&self) -> String {
        let mut path = self.base_path();
        if let Some(version) = &self.version {
            path.push('/');
            path.push_str(version);
        } else if let Some(alias) = &self.alias {
            path.push_str("/v");
            path.push_str(alias);
        }
        if let Some(extras) = &self.extras {
            for segment in extras.split('/') {
                path.push('/');
                path.push_str(&urlencoding::encode(segment));
            }
        }
        path
    }
}

/// Derive canonical parameters from a raw request target.
///
/// Pure syntactic parsing: no existence checks, no side effects.
pub fn normalize(raw_path: &str) -> Result<CanonicalRequestParams> {
    let path = raw_path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let path = path
        .strip_prefix('/')
        .ok_or_else(|| AssetwayError::malformed_path("path must start with '/'"))?;
    let path = path.strip_suffix('/').unwrap_or(path);

    let mut segments = path
        .split('/')
        .map(decode_segment)
        .collect::<Result<Vec<_>>>()?
        .into_iter();

    let kind: Kind = segments
        .next()
        .ok_or_else(|| AssetwayError::malformed_path("missing route kind"))?
        .parse()?;

    let first = segments
        .next()
        .ok_or_else(|| AssetwayError::malformed_path("missing name"))?;

    let (scope, name) = match first.strip_prefix('@') {
        Some(scope) => {
            if scope.is_empty() {
                return Err(AssetwayError::malformed_path("empty scope"));
            }
            let name = segments.next().ok_or_else(|| {
                AssetwayError::malformed_path(format!("scope '@{}' has no name", scope))
            })?;
            (Some(scope.to_string()), name)
        }
        None => (None, first),
    };

    if name.starts_with('@') {
        return Err(AssetwayError::malformed_path(format!(
            "'{}' is not a valid name",
            name
        )));
    }

    let (version, alias) = match segments.next() {
        None => (None, None),
        Some(token) => match classify(&token)? {
            Token::Version => (Some(token), None),
            Token::Alias(alias) => (None, Some(alias)),
        },
    };

    let rest: Vec<String> = segments.collect();
    let extras = if rest.is_empty() {
        None
    } else {
        Some(rest.join("/"))
    };

    Ok(CanonicalRequestParams {
        kind,
        scope,
        name,
        version,
        alias,
        extras,
    })
}

fn decode_segment(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(AssetwayError::malformed_path("empty path segment"));
    }
    let decoded = urlencoding::decode(raw)
        .map_err(|_| AssetwayError::malformed_path("path segment is not valid UTF-8"))?
        .into_owned();
    if decoded.contains('/') {
        return Err(AssetwayError::malformed_path("encoded '/' inside a path segment"));
    }
    if decoded == "." || decoded == ".." {
        return Err(AssetwayError::malformed_path("relative path segment"));
    }
    Ok(decoded)
}

enum Token {
    Version,
    Alias(String),
}

fn classify(token: &str) -> Result<Token> {
    if let Some(major) = token.strip_prefix('v') {
        if is_numeric_identifier(major) {
            return Ok(Token::Alias(major.to_string()));
        }
        return Err(AssetwayError::malformed_path(format!(
            "'{}' is neither an alias (v<major>) nor a version",
            token
        )));
    }
    if is_version(token) {
        return Ok(Token::Version);
    }
    Err(AssetwayError::malformed_path(format!(
        "'{}' is not a valid version",
        token
    )))
}

/// `MAJOR.MINOR.PATCH[-prerelease][+build]`
pub fn is_version(token: &str) -> bool {
    let (rest, build) = match token.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (token, None),
    };
    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };

    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() != 3 || !parts.iter().all(|p| is_numeric_identifier(p)) {
        return false;
    }
    pre.is_none_or(is_dotted_identifiers) && build.is_none_or(is_dotted_identifiers)
}

/// Major number of a version token, if it is one.
pub fn major_of(version: &str) -> Option<&str> {
    if !is_version(version) {
        return None;
    }
    version.split('.').next()
}

fn is_numeric_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'))
}

fn is_dotted_identifiers(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|id| {
            !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_content_path() {
        let params = normalize("/pkg/@cuz/fuzz/8.4.1/main/index.js").unwrap();
        assert_eq!(params.kind, Kind::Pkg);
        assert_eq!(params.scope.as_deref(), Some("cuz"));
        assert_eq!(params.name, "fuzz");
        assert_eq!(params.version.as_deref(), Some("8.4.1"));
        assert_eq!(params.alias, None);
        assert_eq!(params.extras.as_deref(), Some("main/index.js"));
        assert_eq!(params.shape(), Shape::VersionExtras);
    }

    #[test]
    fn test_unscoped_paths_have_no_scope() {
        for path in ["/pkg/fuzz", "/npm/fuzz/1.0.0", "/map/fuzz/v1", "/pkg/fuzz/1.0.0/a/b"] {
            let params = normalize(path).unwrap();
            assert_eq!(params.scope, None, "{}", path);
            assert_eq!(params.name, "fuzz", "{}", path);
        }
    }

    #[test]
    fn test_scoped_paths_split_scope_and_name() {
        for path in ["/pkg/@cuz/fuzz", "/npm/@cuz/fuzz/1.0.0", "/map/@cuz/fuzz/v2/x"] {
            let params = normalize(path).unwrap();
            assert_eq!(params.scope.as_deref(), Some("cuz"), "{}", path);
            assert_eq!(params.name, "fuzz", "{}", path);
        }
    }

    #[test]
    fn test_encoded_scope_marker() {
        let params = normalize("/npm/%40cuz/fuzz/1.2.3").unwrap();
        assert_eq!(params.scope.as_deref(), Some("cuz"));
        assert_eq!(params.kind, Kind::Npm);
    }

    #[test]
    fn test_version_vs_alias() {
        let params = normalize("/pkg/fuzz/8.4.1").unwrap();
        assert_eq!(params.version.as_deref(), Some("8.4.1"));
        assert_eq!(params.alias, None);
        assert_eq!(params.shape(), Shape::Version);

        let params = normalize("/pkg/fuzz/v8").unwrap();
        assert_eq!(params.version, None);
        assert_eq!(params.alias.as_deref(), Some("8"));
        assert_eq!(params.shape(), Shape::Alias);

        let params = normalize("/pkg/fuzz/v8/main/index.js").unwrap();
        assert_eq!(params.alias.as_deref(), Some("8"));
        assert_eq!(params.extras.as_deref(), Some("main/index.js"));
        assert_eq!(params.shape(), Shape::AliasExtras);
    }

    #[test]
    fn test_prerelease_and_build_versions() {
        for v in ["1.0.0-beta.1", "1.0.0+build.5", "1.0.0-rc-1+sha.abc", "0.0.0"] {
            let params = normalize(&format!("/pkg/fuzz/{}", v)).unwrap();
            assert_eq!(params.version.as_deref(), Some(v));
        }
    }

    #[test]
    fn test_ambiguous_tokens_are_malformed() {
        for token in ["v8.4", "v8.4.1", "latest", "8.4", "01.2.3", "1.2.3-", "v", "v08", "1.2.3+a..b"] {
            let result = normalize(&format!("/pkg/fuzz/{}", token));
            assert!(
                matches!(result, Err(AssetwayError::MalformedPath(_))),
                "expected {} to be malformed",
                token
            );
        }
    }

    #[test]
    fn test_scope_without_name_is_malformed() {
        assert!(matches!(
            normalize("/pkg/@cuz"),
            Err(AssetwayError::MalformedPath(_))
        ));
        assert!(matches!(
            normalize("/pkg/@cuz/"),
            Err(AssetwayError::MalformedPath(_))
        ));
        assert!(matches!(
            normalize("/pkg/@/fuzz"),
            Err(AssetwayError::MalformedPath(_))
        ));
    }

    #[test]
    fn test_structural_errors() {
        for path in [
            "pkg/fuzz",
            "/",
            "/pkg",
            "/tar/fuzz",
            "/pkg//fuzz",
            "/pkg/fuzz/1.0.0/../secret",
            "/pkg/fuzz/1.0.0/a%2Fb",
            "/pkg/@cuz/@fuzz",
        ] {
            assert!(
                matches!(normalize(path), Err(AssetwayError::MalformedPath(_))),
                "expected {} to be malformed",
                path
            );
        }
    }

    #[test]
    fn test_query_and_trailing_slash_ignored() {
        let params = normalize("/pkg/fuzz/1.0.0/?download=1").unwrap();
        assert_eq!(params.version.as_deref(), Some("1.0.0"));
        assert_eq!(params.extras, None);
    }

    #[test]
    fn test_extras_survive_rejoin() {
        let original = normalize("/pkg/@cuz/fuzz/1.0.0/main/sub%20dir/index.js").unwrap();
        assert_eq!(original.extras.as_deref(), Some("main/sub dir/index.js"));

        let again = normalize(&original.to_path()).unwrap();
        assert_eq!(again, original);
    }

    #[test]
    fn test_deterministic() {
        let a = normalize("/map/@cuz/fuzz/v3").unwrap();
        let b = normalize("/map/@cuz/fuzz/v3").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_full_name_and_base_path() {
        let params = normalize("/npm/@cuz/fuzz/1.0.0").unwrap();
        assert_eq!(params.full_name(), "@cuz/fuzz");
        assert_eq!(params.base_path(), "/npm/@cuz/fuzz");
    }

    #[test]
    fn test_major_of() {
        assert_eq!(major_of("8.4.1"), Some("8"));
        assert_eq!(major_of("10.0.0-beta"), Some("10"));
        assert_eq!(major_of("v8"), None);
    }
}
