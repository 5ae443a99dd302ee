use std::time::Duration;

use setupbase_installer::{InstanceProbe, InstanceSignal};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, PartialEq, Eq)]
pub enum Admission<C> {
    /// Another interactive instance owns the session.
    AlreadyOpen,
    /// `lockfile` is `None` when it could not be claimed; the run goes on
    /// without it.
    Proceed { polls: u32, lockfile: Option<C> },
}

/// Decides whether a Normal-mode run may start.
///
/// A listed sibling holding the lockfile means the installer is already open.
/// Otherwise the lockfile is created exclusively before waiting, so of two
/// launches that see each other only the first to create it waits the other
/// out; the second backs off as already open. Waiting polls at a fixed
/// interval with no timeout.
pub fn admit_normal_instance<P: InstanceProbe>(
    probe: &P,
    mut sleep: impl FnMut(Duration),
) -> Admission<P::Claim> {
    if !probe.is_running(InstanceSignal::ProcessList) {
        // No sibling, so any lockfile left behind is stale.
        let lockfile = probe.claim().map_err(|err| warn_unclaimed(&err)).ok();
        return Admission::Proceed { polls: 0, lockfile };
    }
    if probe.is_running(InstanceSignal::Lockfile) {
        return Admission::AlreadyOpen;
    }

    let lockfile = match probe.try_claim() {
        Ok(Some(claim)) => Some(claim),
        Ok(None) => return Admission::AlreadyOpen,
        Err(err) => {
            warn_unclaimed(&err);
            None
        }
    };

    tracing::debug!("waiting for another instance to exit");
    let mut polls: u32 = 0;
    while probe.is_running(InstanceSignal::ProcessList) {
        sleep(POLL_INTERVAL);
        polls = polls.saturating_add(1);
    }
    Admission::Proceed { polls, lockfile }
}

fn warn_unclaimed(err: &anyhow::Error) {
    tracing::warn!(error = %format!("{err:#}"), "could not claim instance lockfile");
}

/// Update flows never wait; they become a no-op while any sibling runs.
pub fn update_flow_blocked(probe: &impl InstanceProbe) -> bool {
    probe.is_running(InstanceSignal::ProcessList)
}
