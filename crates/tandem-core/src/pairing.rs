use crate::directory::PairingDirectory;
use crate::error::CoreError;
use tandem_db::pairings::PairingRow;
use tandem_db::DbPool;
use tandem_models::pairing::PairingStatus;
use tandem_models::UserId;

/// Create a PENDING pairing from `requester` to `recipient`.
pub async fn request_pairing(
    pool: &DbPool,
    worker_id: u16,
    requester: UserId,
    recipient: UserId,
) -> Result<PairingRow, CoreError> {
    if requester == recipient {
        return Err(CoreError::BadRequest(
            "cannot request a pairing with yourself".into(),
        ));
    }
    tandem_db::users::get_user_by_id(pool, recipient.0)
        .await?
        .ok_or(CoreError::NotFound)?;

    if tandem_db::pairings::get_open_pairing_between(pool, requester.0, recipient.0)
        .await?
        .is_some()
    {
        return Err(CoreError::Conflict(
            "a pairing between these users already exists".into(),
        ));
    }
    for user in [requester, recipient] {
        if tandem_db::pairings::get_active_pairing(pool, user.0)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(format!("user {user} is already paired")));
        }
    }

    let id = tandem_util::snowflake::generate(worker_id);
    let row = tandem_db::pairings::create_pairing(pool, id, requester.0, recipient.0).await?;
    tracing::info!(pairing_id = row.id, %requester, %recipient, "pairing requested");
    Ok(row)
}

/// Accept or reject a PENDING pairing. Only the recipient can resolve it,
/// and a resolved pairing never changes again.
pub async fn respond_pairing(
    pool: &DbPool,
    directory: &dyn PairingDirectory,
    pairing_id: i64,
    recipient: UserId,
    accept: bool,
) -> Result<PairingRow, CoreError> {
    let pairing = tandem_db::pairings::get_pairing(pool, pairing_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if pairing.recipient_id != recipient.0 {
        return Err(CoreError::Forbidden);
    }
    if pairing.status != PairingStatus::Pending {
        return Err(CoreError::Conflict("pairing is already resolved".into()));
    }
    if accept {
        // Pre-check for a friendly error; the UPDATE in `resolve_pairing`
        // re-checks this atomically.
        for user in [pairing.requester_id, pairing.recipient_id] {
            if tandem_db::pairings::get_active_pairing(pool, user)
                .await?
                .is_some()
            {
                return Err(CoreError::Conflict(format!("user {user} is already paired")));
            }
        }
    }

    let status = if accept {
        PairingStatus::Accepted
    } else {
        PairingStatus::Rejected
    };
    let row = tandem_db::pairings::resolve_pairing(pool, pairing_id, recipient.0, status)
        .await?
        // Lost a race with a concurrent resolution or accept.
        .ok_or_else(|| {
            CoreError::Conflict("pairing is already resolved or a party is already paired".into())
        })?;

    if accept {
        directory.invalidate(UserId(row.requester_id)).await;
        directory.invalidate(UserId(row.recipient_id)).await;
    }
    tracing::info!(pairing_id, status = status.as_str(), "pairing resolved");
    Ok(row)
}
