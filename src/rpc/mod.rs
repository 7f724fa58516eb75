//! REST clients for the ledger node and the name service.

pub mod algod;
pub mod nfd;

use reqwest::Url;

pub use algod::AlgodClient;
pub use nfd::NfdClient;

/// Joins `path` onto `base` and appends `query`, tolerating trailing slashes.
pub(crate) fn endpoint_url(base: &str, path: &str, query: &[(&str, &str)]) -> Result<Url, String> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined).map_err(|err| format!("invalid endpoint {joined}: {err}"))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter().copied());
    }
    Ok(url)
}
