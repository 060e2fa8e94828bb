//! Host-driven consistency recovery.

use cotext_core::{DocumentId, SiteId};

use crate::activity::Activity;
use crate::error::{Error, Result};
use crate::session::Session;

/// Stops the host and every participant, replaces each participant's copy of `documents`
/// with the host's, resets all engines, then starts everyone again.
///
/// Nothing is resynchronized when any stop fails.
pub(crate) async fn recover(session: &Session, documents: &[DocumentId]) -> Result<()> {
    if !session.is_host() {
        return Err(Error::NotHost("recover documents"));
    }
    if let Some(missing) = documents.iter().find(|id| session.document(id).is_none()) {
        return Err(Error::UnknownDocument(missing.clone()));
    }

    let participants = session.participants();
    let mut users = Vec::with_capacity(participants.len() + 1);
    users.push(session.local().clone());
    users.extend(participants.iter().cloned());

    tracing::info!(
        documents = documents.len(),
        participants = participants.len(),
        "starting consistency recovery"
    );
    let handles = session
        .stop_manager()
        .stop_all(&users)
        .await
        .ok_or_else(|| Error::RecoveryAborted("a participant did not acknowledge the stop".into()))?;
    session.drain_local_edits();

    let outcome = resync(session, documents, &participants);
    for handle in &handles {
        handle.start();
    }
    match &outcome {
        Ok(()) => tracing::info!(documents = documents.len(), "consistency recovery finished"),
        Err(e) => tracing::warn!(error = %e, "consistency recovery failed"),
    }
    outcome
}

fn resync(session: &Session, documents: &[DocumentId], participants: &[SiteId]) -> Result<()> {
    for id in documents {
        let document = session
            .document(id)
            .ok_or_else(|| Error::UnknownDocument(id.clone()))?;
        let content = document.reset_to_current();
        for user in participants {
            session.sink().dispatch(
                user,
                Activity::Resync {
                    document: id.clone(),
                    content: content.clone(),
                },
            );
        }
        session.watchdog().clear(id);
    }
    Ok(())
}
