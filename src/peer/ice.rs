use crate::error::{Result, StreamError};
use crate::logger::dump_candidate;
use crate::peer::connection::PeerHandle;
use crate::peer::types::{CandidateReport, IceCandidate, NegotiationAnswer};
use tracing::{debug, info, warn};

/// Sets the remote description, then applies every candidate in received
/// order. A rejected candidate is logged and skipped; only the remote
/// description can fail the call.
pub async fn apply_answer(peer: &dyn PeerHandle, answer: &NegotiationAnswer) -> Result<CandidateReport> {
    peer.set_remote_description(&answer.description)
        .await
        .map_err(|e| match e {
            StreamError::Negotiation(_) => e,
            other => StreamError::Negotiation(other.to_string()),
        })?;
    info!("Remote description set successfully");

    analyze_candidates(&answer.candidates);

    let mut report = CandidateReport::default();
    for candidate in &answer.candidates {
        dump_candidate("REMOTE", candidate);
        match peer.add_ice_candidate(candidate).await {
            Ok(()) => {
                report.applied += 1;
                debug!("Added ICE candidate");
            }
            Err(e) => {
                report.skipped += 1;
                warn!("Skipping ICE candidate {:?}: {}", candidate.candidate, e);
            }
        }
    }

    info!(
        "Answer applied: {} candidates added, {} skipped",
        report.applied, report.skipped
    );
    Ok(report)
}

/// Counts candidate types, warning when no relay path is on offer
pub fn analyze_candidates(candidates: &[IceCandidate]) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            host_count += 1;
        } else if candidate.candidate.contains("typ srflx") {
            srflx_count += 1;
        } else if candidate.candidate.contains("typ relay") {
            relay_count += 1;
        }
    }

    debug!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        host_count, srflx_count, relay_count
    );

    if !candidates.is_empty() && relay_count == 0 {
        debug!("No TURN relay candidates in the answer, connectivity through NAT may fail");
    }
}
