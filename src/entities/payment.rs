use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_input_error, invalid_state_error, Error};
use crate::external::ChargeStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Gateway,
    Cash,
    Credit,
}

impl PaymentMethod {
    pub fn name(&self) -> String {
        match self {
            Self::Gateway => "gateway".into(),
            Self::Cash => "cash".into(),
            Self::Credit => "credit".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Payment {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub user_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: Status,
    pub external_reference: Option<String>,
    pub refunded_amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Status {
    Pending,
    Processing,
    Completed,
    Failed { reason: String },
    Cancelled,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "pending".into(),
            Self::Processing => "processing".into(),
            Self::Completed => "completed".into(),
            Self::Failed { reason: _ } => "failed".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }
}

impl Payment {
    pub fn new(
        user_id: Uuid,
        booking_id: Option<Uuid>,
        amount: i64,
        currency: String,
        method: PaymentMethod,
    ) -> Result<Self, Error> {
        if amount < 1 {
            return Err(invalid_input_error());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            booking_id,
            amount,
            currency,
            method,
            status: Status::Pending,
            external_reference: None,
            refunded_amount: 0,
            created_at: Utc::now(),
        })
    }

    /// Credit-funded payments settle inside the booking transaction
    /// and never pass through the processing state.
    pub fn new_settled(
        user_id: Uuid,
        booking_id: Uuid,
        amount: i64,
        currency: String,
    ) -> Result<Self, Error> {
        let mut payment = Self::new(
            user_id,
            Some(booking_id),
            amount,
            currency,
            PaymentMethod::Credit,
        )?;
        payment.status = Status::Completed;

        Ok(payment)
    }

    pub fn is_completed(&self) -> bool {
        match self.status {
            Status::Completed => true,
            _ => false,
        }
    }

    /// What is left to return after earlier refunds.
    pub fn refundable_amount(&self) -> i64 {
        self.amount - self.refunded_amount
    }

    /// Whether this payment already sits in the terminal state the
    /// given gateway outcome produces. Webhooks are delivered at
    /// least once, so replaying such an outcome must be a no-op.
    pub fn already_reconciled(&self, outcome: ChargeStatus) -> bool {
        match (&self.status, outcome) {
            (Status::Completed, ChargeStatus::Charged) => true,
            (Status::Cancelled, ChargeStatus::Cancelled) => true,
            (Status::Failed { reason: _ }, ChargeStatus::Other) => true,
            _ => false,
        }
    }

    /// An external charge was opened; record the gateway's reference.
    #[tracing::instrument]
    pub fn open(&mut self, external_reference: String) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.status = Status::Processing;
                self.external_reference = Some(external_reference);
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending | Status::Processing => {
                self.status = Status::Completed;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn fail(&mut self, reason: String) -> Result<(), Error> {
        match self.status {
            Status::Pending | Status::Processing => {
                self.status = Status::Failed { reason };
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn cancel(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending | Status::Processing => {
                self.status = Status::Cancelled;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    /// Apply a partial or full refund. Legal only once completed;
    /// cumulative refunds never exceed the charged amount.
    #[tracing::instrument]
    pub fn refund(&mut self, amount: i64) -> Result<(), Error> {
        if !self.is_completed() {
            return Err(invalid_state_error());
        }

        if amount < 1 || amount > self.refundable_amount() {
            return Err(invalid_input_error());
        }

        self.refunded_amount += amount;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_payment() -> Payment {
        Payment::new(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            1000,
            "USD".into(),
            PaymentMethod::Gateway,
        )
        .unwrap()
    }

    #[test]
    fn gateway_payment_lifecycle() {
        let mut payment = pending_payment();

        payment.open("ch_1".into()).unwrap();
        assert_eq!(payment.external_reference.as_deref(), Some("ch_1"));

        payment.complete().unwrap();
        assert!(payment.is_completed());
    }

    #[test]
    fn completed_payment_rejects_further_transitions() {
        let mut payment = pending_payment();

        payment.complete().unwrap();

        assert_eq!(payment.complete().unwrap_err().code, 100);
        assert_eq!(payment.fail("late".into()).unwrap_err().code, 100);
        assert_eq!(payment.cancel().unwrap_err().code, 100);
        assert_eq!(payment.open("ch_2".into()).unwrap_err().code, 100);
    }

    #[test]
    fn failure_before_reference_is_recorded() {
        let mut payment = pending_payment();

        payment.fail("gateway unreachable".into()).unwrap();

        assert!(payment.external_reference.is_none());
        assert_eq!(payment.status.name(), "failed");
    }

    #[test]
    fn refund_requires_completed_payment() {
        let mut payment = pending_payment();

        assert_eq!(payment.refund(100).unwrap_err().code, 100);
    }

    #[test]
    fn refunds_accumulate_up_to_the_charged_amount() {
        let mut payment = pending_payment();
        payment.complete().unwrap();

        payment.refund(300).unwrap();
        payment.refund(700).unwrap();
        assert_eq!(payment.refunded_amount, 1000);

        assert_eq!(payment.refund(1).unwrap_err().code, 101);
    }

    #[test]
    fn cancellation_refund_is_capped_by_earlier_refunds() {
        use crate::policy;

        let mut payment =
            Payment::new_settled(Uuid::new_v4(), Uuid::new_v4(), 1000, "USD".into()).unwrap();
        payment.refund(1000).unwrap();

        // a fully self-refunded payment leaves a later cancellation
        // nothing to return, so the ledger write is skipped entirely
        let owed = policy::refund_amount(payment.amount, 100);
        assert_eq!(owed.min(payment.refundable_amount()), 0);

        let mut partially =
            Payment::new_settled(Uuid::new_v4(), Uuid::new_v4(), 1000, "USD".into()).unwrap();
        partially.refund(600).unwrap();

        let amount = policy::refund_amount(partially.amount, 80).min(partially.refundable_amount());
        assert_eq!(amount, 400);

        partially.refund(amount).unwrap();
        assert_eq!(partially.refundable_amount(), 0);
    }

    #[test]
    fn terminal_outcome_replays_are_detected() {
        let mut completed = pending_payment();
        completed.complete().unwrap();
        assert!(completed.already_reconciled(ChargeStatus::Charged));
        assert!(!completed.already_reconciled(ChargeStatus::Cancelled));
        assert!(!completed.already_reconciled(ChargeStatus::Other));

        let mut cancelled = pending_payment();
        cancelled.cancel().unwrap();
        assert!(cancelled.already_reconciled(ChargeStatus::Cancelled));
        assert!(!cancelled.already_reconciled(ChargeStatus::Charged));

        let mut failed = pending_payment();
        failed.fail("declined".into()).unwrap();
        assert!(failed.already_reconciled(ChargeStatus::Other));

        let pending = pending_payment();
        assert!(!pending.already_reconciled(ChargeStatus::Charged));
    }

    #[test]
    fn settled_credit_payment_is_completed_at_creation() {
        let payment =
            Payment::new_settled(Uuid::new_v4(), Uuid::new_v4(), 1500, "USD".into()).unwrap();

        assert!(payment.is_completed());
        assert!(payment.external_reference.is_none());
    }
}
