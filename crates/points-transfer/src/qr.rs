use chrono::{DateTime, Duration, Utc};
use points_core::error::{invalid_amount, invalid_state, qr_not_found};
use points_core::{CoreError, IdempotencyKey, QrToken, QrTokenId, QrTokenKind, UserId};
use points_idempotency::IdempotencyOutcome;
use points_txn::TransactionManager;

use crate::direct::execute_in_tx;

/// Default validity window for a freshly minted QR token.
pub const QR_TOKEN_TTL_MINUTES: i64 = 15;

pub async fn create_qr_token(
    manager: &TransactionManager,
    owner: UserId,
    kind: QrTokenKind,
    amount: Option<i64>,
    now: DateTime<Utc>,
) -> Result<QrToken, CoreError> {
    if matches!(kind, QrTokenKind::Send) && amount.map_or(true, |a| a <= 0) {
        return Err(invalid_amount("a send-type QR token must carry a positive fixed amount"));
    }
    if let Some(a) = amount {
        if a <= 0 {
            return Err(invalid_amount(format!("QR token amount must be positive, got {a}")));
        }
    }

    let token = QrToken {
        id: QrTokenId::new(),
        code: uuid::Uuid::new_v4().simple().to_string(),
        owner,
        kind,
        amount,
        expires_at: now + Duration::minutes(QR_TOKEN_TTL_MINUTES),
        used_at: None,
        used_by: None,
        created_at: now,
    };

    manager
        .run(move |tx| {
            let token = token.clone();
            Box::pin(async move {
                points_db::repo::qr_tokens::insert(&mut **tx, &token).await?;
                Ok(token)
            })
        })
        .await
}

/// Scanning a token moves points between its owner and the scanner in the
/// direction its `kind` fixes: `receive` pulls scanner → owner,
/// `send` pushes owner → scanner. A token is consumed exactly once.
///
/// The move itself runs through the same idempotency-guarded, ordered-lock
/// transfer path as [`crate::direct_transfer`], keyed by the scanner-supplied
/// idempotency key, so a repeated scan (double-tap, retried request) never
/// moves points twice. The token's `used_at`/`used_by` are set in the same
/// unit of work as the transfer.
pub async fn scan_qr_token(
    manager: &TransactionManager,
    idempotency_key: &IdempotencyKey,
    code: String,
    scanner: UserId,
    scanner_supplied_amount: Option<i64>,
    now: DateTime<Utc>,
) -> Result<IdempotencyOutcome, CoreError> {
    manager
        .run(move |tx| {
            let code = code.clone();
            Box::pin(async move {
                let token = points_db::repo::qr_tokens::find_by_code_for_update(tx, &code).await?;

                // A token already consumed under this exact idempotency key is a
                // replay of a scan that already ran to completion; let it fall
                // through to `execute_in_tx`, which recognizes the key and
                // returns the original outcome without moving points again.
                // Any other already-used or expired token is rejected.
                let is_replay_of_this_key = token.used_at.is_some()
                    && points_db::repo::idempotency::find(&mut **tx, idempotency_key.as_str())
                        .await?
                        .is_some_and(|record| record.status == points_core::IdempotencyStatus::Completed);
                if !token.is_usable(now) && !is_replay_of_this_key {
                    return Err(if token.used_at.is_some() {
                        invalid_state(format!("qr token {code} was already used"))
                    } else {
                        qr_not_found(format!("qr token {code} has expired"))
                    });
                }

                let amount = match (token.amount, scanner_supplied_amount) {
                    (Some(fixed), _) => fixed,
                    (None, Some(chosen)) if chosen > 0 => chosen,
                    (None, _) => return Err(invalid_amount("this QR token requires the scanner to supply a positive amount")),
                };

                let (from, to) = match token.kind {
                    QrTokenKind::Receive => (scanner, token.owner),
                    QrTokenKind::Send => (token.owner, scanner),
                };
                if from == to {
                    return Err(invalid_state("a QR token's owner may not scan their own token"));
                }

                let description = format!("qr token {code} scan");
                let outcome =
                    execute_in_tx(tx, idempotency_key, from, to, amount, &description, now).await?;

                if matches!(outcome, IdempotencyOutcome::Fresh(_)) {
                    let marked = points_db::repo::qr_tokens::mark_used(tx, token.id, scanner, now).await?;
                    if !marked {
                        return Err(invalid_state(format!("qr token {code} was used concurrently")));
                    }
                }

                Ok(outcome)
            })
        })
        .await
}
