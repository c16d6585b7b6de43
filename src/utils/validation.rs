//! Validation utilities

use crate::traits::*;
use crate::types::*;
use bigdecimal::BigDecimal;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> LedgerResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(LedgerError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an account code is valid
pub fn validate_account_code(code: &str) -> LedgerResult<()> {
    if code.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account code cannot be empty".to_string(),
        ));
    }

    if code.len() > 20 {
        return Err(LedgerError::Validation(
            "Account code cannot exceed 20 characters".to_string(),
        ));
    }

    if !code.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(LedgerError::Validation(
            "Account code must start with a digit".to_string(),
        ));
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(LedgerError::Validation(
            "Account code can only contain letters, digits and dashes".to_string(),
        ));
    }

    Ok(())
}

/// Validate that an account name is valid
pub fn validate_account_name(name: &str) -> LedgerResult<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account name cannot be empty".to_string(),
        ));
    }

    if name.len() > 100 {
        return Err(LedgerError::Validation(
            "Account name cannot exceed 100 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate that a transaction description is valid
pub fn validate_transaction_description(description: &str) -> LedgerResult<()> {
    if description.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Transaction description cannot be empty".to_string(),
        ));
    }

    if description.len() > 500 {
        return Err(LedgerError::Validation(
            "Transaction description cannot exceed 500 characters".to_string(),
        ));
    }

    Ok(())
}

/// Enhanced posting validator with detailed checks
pub struct EnhancedTransactionValidator;

impl TransactionValidator for EnhancedTransactionValidator {
    fn validate_entries(&self, entries: &[EntryLine]) -> LedgerResult<()> {
        DefaultTransactionValidator.validate_entries(entries)?;

        let zero = BigDecimal::from(0);
        for entry in entries {
            if entry.account_id.trim().is_empty() {
                return Err(LedgerError::Validation(
                    "Entry account cannot be empty".to_string(),
                ));
            }

            // Exactly one side carries the amount
            match (entry.debit > zero, entry.credit > zero) {
                (true, false) => validate_positive_amount(&entry.debit)?,
                (false, true) => validate_positive_amount(&entry.credit)?,
                (true, true) => {
                    return Err(LedgerError::Validation(format!(
                        "Entry for account '{}' has both a debit and a credit",
                        entry.account_id
                    )))
                }
                (false, false) => {
                    return Err(LedgerError::Validation(format!(
                        "Entry for account '{}' has no amount",
                        entry.account_id
                    )))
                }
            }
        }

        Ok(())
    }

    fn validate_header(&self, transaction: &NewTransaction) -> LedgerResult<()> {
        if transaction.reference.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Transaction reference cannot be empty".to_string(),
            ));
        }
        validate_transaction_description(&transaction.description)
    }
}

/// Enhanced account validator with detailed checks
pub struct EnhancedAccountValidator;

impl AccountValidator for EnhancedAccountValidator {
    fn validate_account(&self, account: &Account) -> LedgerResult<()> {
        validate_account_code(&account.code)?;
        validate_account_name(&account.name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1230", true)]
    #[case("5100-09", true)]
    #[case("", false)]
    #[case("AR-1", false)]
    #[case("12 30", false)]
    fn account_codes(#[case] code: &str, #[case] valid: bool) {
        assert_eq!(validate_account_code(code).is_ok(), valid);
    }

    #[test]
    fn enhanced_validator_rejects_two_sided_lines() {
        let line = EntryLine {
            account_id: "cash".to_string(),
            debit: BigDecimal::from(100),
            credit: BigDecimal::from(100),
            description: None,
        };
        let entries = vec![
            line,
            EntryLine::debit("bank", BigDecimal::from(10), None),
            EntryLine::credit("capital", BigDecimal::from(10), None),
        ];

        assert!(DefaultTransactionValidator.validate_entries(&entries).is_ok());
        assert!(EnhancedTransactionValidator.validate_entries(&entries).is_err());
    }

    #[test]
    fn enhanced_validator_rejects_empty_lines() {
        let entries = vec![
            EntryLine::debit("cash", BigDecimal::from(0), None),
            EntryLine::debit("bank", BigDecimal::from(10), None),
            EntryLine::credit("capital", BigDecimal::from(10), None),
        ];
        assert!(EnhancedTransactionValidator.validate_entries(&entries).is_err());
    }
}
