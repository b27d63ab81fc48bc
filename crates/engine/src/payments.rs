//! Bill payments submitted through a connection.
//!
//! The provider acknowledges a payment with a reference; the final outcome
//! arrives later as a `transfer_status` webhook matched on that reference.

use serde::Deserialize;

use ledgerlink_core::status::{BillPaymentStatus, ConnectionStatus};
use ledgerlink_core::types::{to_major_units, DbId, MinorUnits};
use ledgerlink_db::models::bill_payment::{BillPayment, NewBillPayment};
use ledgerlink_db::store::StoreError;
use ledgerlink_openbanking::messages::PayBillRequest;
use ledgerlink_openbanking::ProviderError;

use crate::lifecycle::{ConnectionLifecycle, LifecycleError};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Connection {id} is {status}; payments need an active connection")]
    NotActive { id: DbId, status: ConnectionStatus },

    #[error("Payment amount must be positive")]
    InvalidAmount,

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A bill payment as requested by the user. Amount in minor units.
#[derive(Debug, Clone, Deserialize)]
pub struct BillPaymentRequest {
    pub category_id: String,
    pub biller_id: String,
    pub bill_reference: String,
    pub amount: MinorUnits,
    #[serde(default)]
    pub narration: Option<String>,
}

/// Map a provider payment or transfer status onto [`BillPaymentStatus`].
pub fn parse_provider_status(value: &str) -> Option<BillPaymentStatus> {
    match value.trim().to_ascii_lowercase().as_str() {
        "pending" | "processing" => Some(BillPaymentStatus::Pending),
        "successful" | "success" | "completed" => Some(BillPaymentStatus::Successful),
        "failed" | "declined" => Some(BillPaymentStatus::Failed),
        "reversed" => Some(BillPaymentStatus::Reversed),
        _ => None,
    }
}

#[derive(Clone)]
pub struct BillPayments {
    lifecycle: ConnectionLifecycle,
}

impl BillPayments {
    pub fn new(lifecycle: ConnectionLifecycle) -> Self {
        Self { lifecycle }
    }

    /// Submit a payment from the connection's account and record it.
    ///
    /// Payments are never retried automatically; a resubmission would
    /// carry a fresh idempotency key and could pay twice.
    pub async fn pay_bill(
        &self,
        connection_id: DbId,
        request: BillPaymentRequest,
    ) -> Result<BillPayment, PaymentError> {
        if request.amount <= 0 {
            return Err(PaymentError::InvalidAmount);
        }

        let ctx = self.lifecycle.context();
        let _guard = ctx.locks.acquire(connection_id).await;
        let connection = self.lifecycle.load(connection_id).await?;
        let status = connection.status();
        if status != ConnectionStatus::Active {
            return Err(PaymentError::NotActive {
                id: connection_id,
                status,
            });
        }
        let connection = self.lifecycle.ensure_fresh(&connection).await?;
        let session = self.lifecycle.session(&connection)?;

        let provider_request = PayBillRequest {
            category_id: request.category_id.clone(),
            biller_id: request.biller_id.clone(),
            bill_reference: request.bill_reference.clone(),
            source_account: connection.account_number.clone(),
            amount: to_major_units(request.amount),
            narration: request.narration.clone(),
        };
        let receipt = match ctx.provider.pay_bill(&session, &provider_request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(connection_id, biller_id = %request.biller_id, error = %e, "Bill payment rejected");
                self.lifecycle.record_provider_failure(&connection, &e).await;
                return Err(e.into());
            }
        };

        let payment_status = parse_provider_status(&receipt.status).unwrap_or_else(|| {
            tracing::warn!(status = %receipt.status, reference = %receipt.reference, "Unknown payment status, recording as pending");
            BillPaymentStatus::Pending
        });
        let payment = ctx
            .store
            .insert_bill_payment(&NewBillPayment {
                user_id: connection.user_id,
                bank_connection_id: Some(connection_id),
                biller_id: request.biller_id,
                customer_reference: request.bill_reference,
                amount: request.amount,
                external_reference: receipt.reference.clone(),
                status: payment_status,
                status_message: receipt.message.clone(),
                metadata: serde_json::json!({
                    "category_id": request.category_id,
                    "narration": request.narration,
                    "provider_status": receipt.status,
                }),
            })
            .await?;

        tracing::info!(
            connection_id,
            payment_id = payment.id,
            reference = %payment.external_reference,
            status = %payment_status,
            "Bill payment submitted",
        );
        Ok(payment)
    }
}
