//! Change-range resolution between two refs.

use super::git::Vcs;
use super::parser::parse_change_ranges;
use super::{ChangeRanges, DiffError};

/// Compute the lines changed on `head_ref` since it diverged from `base_ref`.
///
/// Refs unknown locally are shallow-fetched from `remote` (when given) and
/// resolved as `remote/ref`. The fetch is attempted once; no retries.
pub async fn measure_change_ranges(
    vcs: &dyn Vcs,
    base_ref: &str,
    head_ref: &str,
    remote: Option<&str>,
) -> Result<ChangeRanges, DiffError> {
    tracing::debug!(base_ref, head_ref, remote, "measuring change ranges");

    let base = resolve(vcs, base_ref, remote).await?;
    let head = resolve(vcs, head_ref, remote).await?;

    let lines = vcs.diff(&base, &head).await?;
    let ranges = parse_change_ranges(&lines);
    tracing::debug!(files = ranges.len(), "change ranges measured");
    Ok(ranges)
}

async fn resolve(vcs: &dyn Vcs, refspec: &str, remote: Option<&str>) -> Result<String, DiffError> {
    if let Some(sha) = vcs.parse_revision(refspec, None).await {
        return Ok(sha);
    }
    let Some(remote) = remote else {
        return Err(DiffError::RefResolution(refspec.to_string()));
    };

    let qualified = format!("{remote}/{refspec}");
    if let Err(e) = vcs.fetch_shallow(remote, refspec, 1).await {
        tracing::debug!(remote, refspec, error = %e, "shallow fetch failed");
        return Err(DiffError::RefResolution(qualified));
    }
    vcs.parse_revision(refspec, Some(remote))
        .await
        .ok_or(DiffError::RefResolution(qualified))
}
