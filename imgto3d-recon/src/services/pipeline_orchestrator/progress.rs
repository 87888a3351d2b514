//! Progress extraction from external tool output
//!
//! Tools report progress in their own log phrasing, so the orchestrator asks a
//! [`ProgressSniffer`] for a `current / total` pair per line and maps it into
//! the stage's window itself. Lines without a marker carry no percent.

/// Extracts `(current, total)` from one output line
pub trait ProgressSniffer: Send + Sync {
    fn sniff(&self, line: &str) -> Option<(u64, u64)>;
}

/// Recognizes the first `[current/total]` marker in a line, e.g.
/// `Processing view [12/40] for ...`
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketProgressSniffer;

impl ProgressSniffer for BracketProgressSniffer {
    fn sniff(&self, line: &str) -> Option<(u64, u64)> {
        let mut rest = line;
        while let Some(open) = rest.find('[') {
            rest = &rest[open + 1..];
            let close = rest.find(']')?;
            if let Some(pair) = parse_pair(&rest[..close]) {
                return Some(pair);
            }
        }
        None
    }
}

fn parse_pair(inner: &str) -> Option<(u64, u64)> {
    let (current, total) = inner.split_once('/')?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(current) || !digits(total) {
        return None;
    }
    let total: u64 = total.parse().ok()?;
    if total == 0 {
        return None;
    }
    Some((current.parse().ok()?, total))
}
