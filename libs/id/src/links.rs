//! Document link helpers.
//!
//! Links are absolute paths. A factory link (`/resources/disks`) plus a
//! document id gives the document's self-link (`/resources/disks/abc`).

/// Factory for compute resource records.
pub const COMPUTE_FACTORY: &str = "/resources/compute";

/// Factory for disk records.
pub const DISK_FACTORY: &str = "/resources/disks";

/// Factory for network interface records.
pub const NIC_FACTORY: &str = "/resources/network-interfaces";

/// Factory for composite components; the context id names the child.
pub const COMPOSITE_COMPONENT_FACTORY: &str = "/resources/composite-components";

/// Joins path segments into a single link, collapsing duplicate slashes.
///
/// ```
/// use vmalloc_id::links::build_path;
/// assert_eq!(build_path(&["/resources/", "/disks", "d1"]), "/resources/disks/d1");
/// ```
pub fn build_path(segments: &[&str]) -> String {
    let mut out = String::new();
    for segment in segments {
        for part in segment.split('/').filter(|p| !p.is_empty()) {
            out.push('/');
            out.push_str(part);
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Returns the final path segment of a link (the document id).
pub fn last_segment(link: &str) -> &str {
    link.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}
