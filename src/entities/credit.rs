use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{insufficient_funds_error, invalid_input_error, Error};

/// Authorization resource for a user's credit ledger; the account
/// carries no state of its own beyond who owns it.
#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct CreditAccount {
    #[polar(attribute)]
    pub id: Uuid,
}

impl CreditAccount {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Purchase,
    Payment,
    Refund,
}

impl Kind {
    pub fn name(&self) -> String {
        match self {
            Self::Purchase => "purchase".into(),
            Self::Payment => "payment".into(),
            Self::Refund => "refund".into(),
        }
    }
}

/// One row of a user's append-only credit ledger. Rows are never
/// mutated or deleted; the account balance is the `balance_after` of
/// the newest row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: Kind,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub booking_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Build the next ledger row for an account. Purchases and
    /// refunds credit the account, payments debit it; a debit below
    /// zero is refused. The caller must hold the account lock so the
    /// balance chain stays gapless.
    pub fn next(
        user_id: Uuid,
        kind: Kind,
        amount: i64,
        balance_before: i64,
        booking_id: Option<Uuid>,
        payment_id: Option<Uuid>,
    ) -> Result<Self, Error> {
        let valid_sign = match kind {
            Kind::Purchase | Kind::Refund => amount > 0,
            Kind::Payment => amount < 0,
        };

        if !valid_sign {
            return Err(invalid_input_error());
        }

        let balance_after = balance_before + amount;

        if balance_after < 0 {
            return Err(insufficient_funds_error());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            balance_before,
            balance_after,
            booking_id,
            payment_id,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_chain_is_exact() {
        let user_id = Uuid::new_v4();

        let purchase =
            CreditTransaction::next(user_id, Kind::Purchase, 2000, 0, None, None).unwrap();
        assert_eq!(purchase.balance_after, 2000);

        let payment = CreditTransaction::next(
            user_id,
            Kind::Payment,
            -1500,
            purchase.balance_after,
            Some(Uuid::new_v4()),
            None,
        )
        .unwrap();
        assert_eq!(payment.balance_before, 2000);
        assert_eq!(payment.balance_after, 500);

        let refund = CreditTransaction::next(
            user_id,
            Kind::Refund,
            750,
            payment.balance_after,
            Some(Uuid::new_v4()),
            None,
        )
        .unwrap();
        assert_eq!(refund.balance_after, 1250);

        for row in [&purchase, &payment, &refund] {
            assert_eq!(row.balance_after, row.balance_before + row.amount);
        }
    }

    #[test]
    fn debit_below_zero_is_refused() {
        let err = CreditTransaction::next(Uuid::new_v4(), Kind::Payment, -100, 99, None, None)
            .unwrap_err();

        assert_eq!(err.code, 106);
    }

    #[test]
    fn sign_must_match_kind() {
        let user_id = Uuid::new_v4();

        let err =
            CreditTransaction::next(user_id, Kind::Purchase, -100, 1000, None, None).unwrap_err();
        assert_eq!(err.code, 101);

        let err =
            CreditTransaction::next(user_id, Kind::Payment, 100, 1000, None, None).unwrap_err();
        assert_eq!(err.code, 101);

        let err = CreditTransaction::next(user_id, Kind::Refund, 0, 1000, None, None).unwrap_err();
        assert_eq!(err.code, 101);
    }
}
