//! Per-loan cash flow replay for a fractional investor.
//!
//! Each loan is replayed once at load time: the amortization schedule is
//! walked month by month for a constant dollar stake, charging the 1% service
//! fee on every installment and stopping at the point a charged-off loan fell
//! behind its schedule. The resulting [`LoanFinancialSummary`] is cached and
//! never recomputed during the search.

use chrono::NaiveDate;
use serde::Serialize;

use crate::errors::{LoanBacktestError, Result};

/// Dollar amount invested in every note.
pub const DEFAULT_STAKE: f64 = 25.0;

/// Service fee charged on each installment.
pub const SERVICE_FEE_RATE: f64 = 0.01;

/// Fraction of the outstanding schedule counted as lost on default; the rest
/// models collection recoveries.
pub const DEFAULT_LOSS_FACTOR: f64 = 0.99;

/// Contractual loan length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanTerm {
    ThirtySixMonths,
    SixtyMonths,
}

impl LoanTerm {
    pub fn months(self) -> u32 {
        match self {
            LoanTerm::ThirtySixMonths => 36,
            LoanTerm::SixtyMonths => 60,
        }
    }

    /// Parse the export's ` 36 months` / ` 60 months` text.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "36 months" => Ok(LoanTerm::ThirtySixMonths),
            "60 months" => Ok(LoanTerm::SixtyMonths),
            other => Err(LoanBacktestError::UnsupportedTerm(other.to_string())),
        }
    }
}

/// Whether a loan status means the borrower stopped paying for good.
pub fn is_default_status(status: &str) -> bool {
    status == "Charged Off" || status == "Default"
}

/// Validated per-loan inputs of the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanCashFlows {
    pub funded_amount: f64,
    /// Number of scheduled monthly installments.
    pub number_of_payments: u32,
    /// Nominal annual interest rate in percent.
    pub annual_rate: f64,
    pub installment: f64,
    /// Everything the borrower paid so far.
    pub total_payment: f64,
    pub total_received_interest: f64,
    pub total_received_principal: f64,
    pub status: String,
    pub issue_date: NaiveDate,
}

/// Cached investor view of one loan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanFinancialSummary {
    /// Interest minus fees and default losses earned by the stake.
    pub profit: f64,
    /// Sum of the stake's outstanding balance over the months it was exposed.
    pub principal: f64,
    /// Default loss charged to the stake; zero unless the loan defaulted.
    pub lost: f64,
    pub defaulted: bool,
    pub annual_rate: f64,
    pub issue_date: NaiveDate,
    pub status: String,
}

/// Replay the amortization schedule of one loan for a `stake` dollar note.
pub fn simulate_loan(flows: &LoanCashFlows, stake: f64) -> LoanFinancialSummary {
    let defaulted = is_default_status(&flows.status);
    let ratio = if flows.funded_amount > 0.0 {
        stake / flows.funded_amount
    } else {
        0.0
    };

    let mut balance = flows.funded_amount;
    let mut profit = 0.0;
    let mut principal = 0.0;
    let mut lost = 0.0;
    let mut scheduled_payments = 0.0;

    for _ in 0..flows.number_of_payments {
        // Interest and service charge on the whole loan, not just the stake.
        let interest = balance * flows.annual_rate / 1200.0;
        let service_fee = SERVICE_FEE_RATE * flows.installment;
        scheduled_payments += flows.installment;

        if defaulted && scheduled_payments > flows.total_payment {
            let default_loss = DEFAULT_LOSS_FACTOR
                * (f64::from(flows.number_of_payments) * flows.installment
                    - (flows.total_received_interest + flows.total_received_principal));
            profit -= default_loss * ratio;
            lost += default_loss * ratio;
            break;
        }

        profit += (interest - service_fee) * ratio;
        principal += balance * ratio;
        balance -= flows.installment;
    }

    LoanFinancialSummary {
        profit,
        principal,
        lost,
        defaulted,
        annual_rate: flows.annual_rate,
        issue_date: flows.issue_date,
        status: flows.status.clone(),
    }
}
