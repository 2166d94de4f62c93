//! Domain name ↔ container path mapping.
//!
//! A domain is a dotted name ending in the configured suffix. The labels in
//! front of the suffix, read right to left, are the directories below the
//! data root; the leftmost label is the container's file stem. A literal dot
//! inside a label is written `%2E`.
//!
//! ```text
//! tall.dots.example.org        -> <root>/dots/tall.h5
//! tall%2Edots.example.org      -> <root>/tall.dots.h5
//! bob.home.example.org         -> <root>/home/bob/.toc.h5
//! example.org, localhost, IPs  -> <root>/.toc.h5
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::NamespaceConfig;
use crate::error::{NamespaceError, NamespaceResult};
use crate::users::UserDirectory;

const ESCAPED_DOT: &str = "%2E";
const ESCAPED_PERCENT: &str = "%25";

/// Escape literal dots (and the `%` that introduces escapes) in one path
/// component.
pub fn escape_label(name: &str) -> String {
    name.replace('%', ESCAPED_PERCENT).replace('.', ESCAPED_DOT)
}

/// Decode `%2E` and `%25` (either case) in a single pass. Any other `%`
/// is kept as is.
pub fn unescape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut rest = label;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let escape = rest.get(pos..pos + 3);
        match escape {
            Some(e) if e.eq_ignore_ascii_case(ESCAPED_DOT) => out.push('.'),
            Some(e) if e == ESCAPED_PERCENT => out.push('%'),
            _ => {
                out.push('%');
                rest = &rest[pos + 1..];
                continue;
            }
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    out
}

/// A single-label host or a dotted quad addresses the server itself.
fn is_bare_host(host: &str) -> bool {
    let parts: Vec<&str> = host.split('.').collect();
    match parts.len() {
        1 => true,
        4 => parts.iter().all(|p| !p.is_empty() && p.parse::<u8>().is_ok()),
        _ => false,
    }
}

/// Strip a trailing `:port`.
fn strip_port(domain: &str) -> &str {
    match domain.rfind(':') {
        Some(pos) if pos > 0 => &domain[..pos],
        _ => domain,
    }
}

pub struct NamespaceMapper {
    config: NamespaceConfig,
    users: Arc<dyn UserDirectory>,
}

impl NamespaceMapper {
    pub fn new(config: NamespaceConfig, users: Arc<dyn UserDirectory>) -> Self {
        Self { config, users }
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    pub fn users(&self) -> &dyn UserDirectory {
        self.users.as_ref()
    }

    pub fn shared_toc_path(&self) -> PathBuf {
        self.config.data_root.join(&self.config.toc_name)
    }

    pub fn user_toc_path(&self, user: &str) -> PathBuf {
        self.config.home_dir().join(user).join(&self.config.toc_name)
    }

    /// Whether `path` names a TOC container.
    pub fn is_toc_path(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name == self.config.toc_name.as_str())
    }

    pub fn has_container_ext(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.len() > self.config.container_ext.len() && n.ends_with(&self.config.container_ext))
    }

    /// The labels in front of the suffix, outermost first, already
    /// unescaped. `None` means the domain addresses the shared TOC.
    fn labels(&self, domain: &str) -> NamespaceResult<Option<Vec<String>>> {
        let host = strip_port(domain);
        let suffix = &self.config.domain_suffix;
        if is_bare_host(host) || host.eq_ignore_ascii_case(suffix) {
            return Ok(None);
        }
        let split = host.len().checked_sub(suffix.len() + 1);
        let remainder = match split {
            Some(at)
                if host.is_char_boundary(at)
                    && host.as_bytes()[at] == b'.'
                    && host[at + 1..].eq_ignore_ascii_case(suffix) =>
            {
                &host[..at]
            }
            _ => {
                return Err(NamespaceError::invalid(
                    domain,
                    format!("must end with .{suffix}"),
                ))
            }
        };
        if remainder.is_empty() || remainder.starts_with('.') || remainder.ends_with('.') {
            return Err(NamespaceError::invalid(domain, "empty or dot-delimited name"));
        }

        let mut labels = Vec::new();
        for label in remainder.split('.').rev() {
            if label.is_empty() {
                return Err(NamespaceError::invalid(domain, "empty label"));
            }
            let name = unescape_label(label);
            if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
                return Err(NamespaceError::invalid(domain, format!("label {label:?} is not a valid file name")));
            }
            labels.push(name);
        }
        Ok(Some(labels))
    }

    /// Container path for `domain`.
    pub fn domain_to_path(&self, domain: &str) -> NamespaceResult<PathBuf> {
        let Some(labels) = self.labels(domain)? else {
            return Ok(self.shared_toc_path());
        };
        if labels.len() == 2 && labels[0] == self.config.home_label {
            let user = &labels[1];
            if self.users.lookup(user).is_none() {
                return Err(NamespaceError::UnknownUser(user.clone()));
            }
            return Ok(self.user_toc_path(user));
        }

        let mut path = self.config.data_root.clone();
        let (stem, dirs) = labels
            .split_last()
            .ok_or_else(|| NamespaceError::invalid(domain, "no labels"))?;
        for dir in dirs {
            path.push(dir);
        }
        path.push(format!("{stem}{}", self.config.container_ext));
        Ok(path)
    }

    /// Domain for a container path or a directory under the data root.
    /// A TOC file maps to the domain of its directory.
    pub fn path_to_domain(&self, path: &Path) -> NamespaceResult<String> {
        let path = if self.is_toc_path(path) {
            path.parent().unwrap_or(path)
        } else {
            path
        };
        let relative = path
            .strip_prefix(&self.config.data_root)
            .map_err(|_| NamespaceError::OutsideDataRoot(path.to_path_buf()))?;

        let mut labels = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    let name = name
                        .to_str()
                        .ok_or_else(|| NamespaceError::NonUtf8Path(path.to_path_buf()))?;
                    labels.push(name.to_string());
                }
                Component::CurDir => {}
                _ => return Err(NamespaceError::OutsideDataRoot(path.to_path_buf())),
            }
        }
        if let Some(last) = labels.last_mut() {
            if let Some(stem) = last.strip_suffix(self.config.container_ext.as_str()) {
                if !stem.is_empty() {
                    *last = stem.to_string();
                }
            }
        }

        let mut domain = String::new();
        for label in labels.iter().rev() {
            domain.push_str(&escape_label(label));
            domain.push('.');
        }
        domain.push_str(&self.config.domain_suffix);
        Ok(domain)
    }

    /// The TOC that lists `domain`: the owner's TOC for domains under
    /// `home.<user>`, the shared TOC otherwise.
    pub fn toc_path_for_domain(&self, domain: &str) -> NamespaceResult<PathBuf> {
        let labels = self.labels(domain)?.unwrap_or_default();
        if labels.len() >= 2 && labels[0] == self.config.home_label {
            let user = &labels[1];
            if self.users.lookup(user).is_none() {
                return Err(NamespaceError::UnknownUser(user.clone()));
            }
            return Ok(self.user_toc_path(user));
        }
        Ok(self.shared_toc_path())
    }

    /// The owning user of a domain under `home.<user>`.
    pub fn home_user(&self, domain: &str) -> NamespaceResult<Option<String>> {
        let labels = self.labels(domain)?.unwrap_or_default();
        Ok((labels.len() >= 2 && labels[0] == self.config.home_label).then(|| labels[1].clone()))
    }
}

impl std::fmt::Debug for NamespaceMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceMapper")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::InMemoryUserDirectory;
    use arbor_types::ErrorKind;
    use proptest::prelude::*;

    fn mapper(suffix: &str) -> NamespaceMapper {
        let config = NamespaceConfig {
            domain_suffix: suffix.into(),
            ..NamespaceConfig::with_root("/srv/data")
        };
        let users = InMemoryUserDirectory::new().with_user("bob", 13).unwrap();
        NamespaceMapper::new(config, Arc::new(users))
    }

    // ---- domain to path ----

    #[test]
    fn labels_reverse_into_directories() {
        let m = mapper("example.org");
        assert_eq!(
            m.domain_to_path("tall.dots.example.org").unwrap(),
            PathBuf::from("/srv/data/dots/tall.h5")
        );
        assert_eq!(
            m.domain_to_path("a.example.org:5000").unwrap(),
            PathBuf::from("/srv/data/a.h5")
        );
    }

    #[test]
    fn bare_hosts_map_to_shared_toc() {
        let m = mapper("example.org");
        let toc = PathBuf::from("/srv/data/.toc.h5");
        for host in ["example.org", "EXAMPLE.org", "localhost", "127.0.0.1:8080", "10.0.0.7"] {
            assert_eq!(m.domain_to_path(host).unwrap(), toc, "{host}");
        }
    }

    #[test]
    fn suffix_is_case_insensitive_labels_keep_case() {
        let m = mapper("example.org");
        assert_eq!(
            m.domain_to_path("Tall.Example.ORG").unwrap(),
            PathBuf::from("/srv/data/Tall.h5")
        );
    }

    #[test]
    fn malformed_domains_are_bad_requests() {
        let m = mapper("example.org");
        for domain in [
            "a.other.org",
            "aexample.org",
            ".example.org",
            "a..b.example.org",
            "a.b..example.org",
            "%2E%2E.example.org",
            "x.y",
        ] {
            let err = m.domain_to_path(domain).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BadRequest, "{domain}");
        }
    }

    #[test]
    fn home_domains_route_to_user_toc() {
        let m = mapper("example.org");
        assert_eq!(
            m.domain_to_path("bob.home.example.org").unwrap(),
            PathBuf::from("/srv/data/home/bob/.toc.h5")
        );
        let err = m.domain_to_path("eve.home.example.org").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            m.domain_to_path("x.bob.home.example.org").unwrap(),
            PathBuf::from("/srv/data/home/bob/x.h5")
        );
    }

    #[test]
    fn toc_for_domain() {
        let m = mapper("example.org");
        assert_eq!(
            m.toc_path_for_domain("x.bob.home.example.org").unwrap(),
            PathBuf::from("/srv/data/home/bob/.toc.h5")
        );
        assert_eq!(
            m.toc_path_for_domain("x.y.example.org").unwrap(),
            PathBuf::from("/srv/data/.toc.h5")
        );
        assert_eq!(m.home_user("x.bob.home.example.org").unwrap().as_deref(), Some("bob"));
        assert_eq!(m.home_user("x.example.org").unwrap(), None);
    }

    // ---- path to domain ----

    #[test]
    fn path_to_domain_inverts() {
        let m = mapper("example.org");
        assert_eq!(m.path_to_domain(Path::new("/srv/data")).unwrap(), "example.org");
        assert_eq!(
            m.path_to_domain(Path::new("/srv/data/dots/tall.h5")).unwrap(),
            "tall.dots.example.org"
        );
        assert_eq!(
            m.path_to_domain(Path::new("/srv/data/.toc.h5")).unwrap(),
            "example.org"
        );
        assert_eq!(
            m.path_to_domain(Path::new("/srv/data/home/bob/.toc.h5")).unwrap(),
            "bob.home.example.org"
        );
        assert!(matches!(
            m.path_to_domain(Path::new("/elsewhere/a.h5")),
            Err(NamespaceError::OutsideDataRoot(_))
        ));
    }

    #[test]
    fn long_dotted_domain_round_trips() {
        let m = mapper("example.org");
        let domain = "tall.dots.need.to.be.encoded.example.org";
        let path = m.domain_to_path(domain).unwrap();
        assert_eq!(path, PathBuf::from("/srv/data/encoded/be/to/need/dots/tall.h5"));
        assert_eq!(m.path_to_domain(&path).unwrap(), domain);
    }

    #[test]
    fn escaped_dot_maps_to_literal_dot() {
        let m = mapper("example.org");
        let path = m.domain_to_path("tall%2Edots.example.org").unwrap();
        assert_eq!(path, PathBuf::from("/srv/data/tall.dots.h5"));
        assert_eq!(m.path_to_domain(&path).unwrap(), "tall%2Edots.example.org");
        assert_eq!(
            m.domain_to_path("tall%2edots.example.org").unwrap(),
            PathBuf::from("/srv/data/tall.dots.h5")
        );
    }

    #[test]
    fn escaping_helpers() {
        assert_eq!(escape_label("a.b.c"), "a%2Eb%2Ec");
        assert_eq!(unescape_label("a%2Eb%2ec"), "a.b.c");
        assert_eq!(escape_label("a%2Eb"), "a%252Eb");
        assert_eq!(unescape_label("a%252Eb"), "a%2Eb");
        assert_eq!(unescape_label("100%"), "100%");
        assert_eq!(unescape_label("%€x"), "%€x");
        assert!(is_bare_host("localhost"));
        assert!(is_bare_host("192.168.0.1"));
        assert!(!is_bare_host("300.1.1.1"));
        assert!(!is_bare_host("a.b.c.d"));
    }

    #[test]
    fn percent_in_file_name_round_trips() {
        let m = mapper("example.org");
        let path = PathBuf::from("/srv/data/a%2Eb.h5");
        let domain = m.path_to_domain(&path).unwrap();
        assert_eq!(domain, "a%252Eb.example.org");
        assert_eq!(m.domain_to_path(&domain).unwrap(), path);
    }

    fn label() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_-]{1,8}(%2E|%25)?[A-Za-z0-9_-]{0,6}"
    }

    proptest! {
        #[test]
        fn domain_bijection(labels in prop::collection::vec(label(), 1..5), upper in any::<bool>()) {
            prop_assume!(!(labels.len() == 2 && labels[1] == "home"));
            let m = mapper("example.org");
            let suffix = if upper { "EXAMPLE.ORG" } else { "example.org" };
            let domain = format!("{}.{suffix}", labels.join("."));
            let path = m.domain_to_path(&domain).unwrap();
            let expected = format!("{}.example.org", labels.join("."));
            prop_assert_eq!(m.path_to_domain(&path).unwrap(), expected);
        }
    }
}
