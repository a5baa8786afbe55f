use std::io::Write;

use super::fixtures::{catalog, export, reference_date, LoanRow};
use crate::data::{LoadStatistics, LoanDataLoader};
use crate::errors::LoanBacktestError;
use crate::filters::{Attribute, NEVER_DELINQUENT};

#[test]
fn row_checks_are_counted() {
    let rows = vec![
        LoanRow::paid(1),
        LoanRow::charged_off(2).with(|row| {
            row.grade = "D".to_string();
            row.term = " 60 months".to_string();
        }),
        LoanRow::paid(3).with(|row| row.issue_d = "Jun-2014".to_string()),
        LoanRow::paid(4).with(|row| row.loan_status = "Removed".to_string()),
        LoanRow::paid(5).with(|row| row.loan_status = String::new()),
        LoanRow::paid(6).with(|row| row.term = " 12 months".to_string()),
        LoanRow::paid(7).with(|row| row.issue_d = "sometime".to_string()),
        LoanRow::paid(8).with(|row| row.loan_status = "Expired".to_string()),
    ];
    let catalog = catalog();
    let loader = LoanDataLoader::new(&catalog, 120, 25.0, reference_date());
    let dataset = loader.load_reader(export(&rows).as_bytes()).unwrap();

    assert_eq!(dataset.len(), 2);
    assert_eq!(
        dataset.statistics(),
        LoadStatistics {
            rows: 9,
            loaded: 2,
            skipped: 3,
            young: 1,
            removed_expired: 2,
            unsupported_term: 1,
        }
    );
}

#[test]
fn attributes_are_normalized() {
    let row = LoanRow::paid(1).with(|row| {
        row.emp_length = "10+ years".to_string();
        row.home_ownership = "MORTGAGE".to_string();
    });
    let catalog = catalog();
    let loader = LoanDataLoader::new(&catalog, 120, 25.0, reference_date());
    let dataset = loader.load_reader(export(&[row]).as_bytes()).unwrap();

    let loan = dataset.records()[0];
    assert_eq!(loan.get(Attribute::FundedAmount), 10_000);
    assert_eq!(loan.get(Attribute::AnnualIncome), 60_000);
    assert_eq!(loan.get(Attribute::CreditGrade), 0b10);
    assert_eq!(loan.get(Attribute::DebtToIncomeRatio), 1_550);
    assert_eq!(loan.get(Attribute::RevolUtilization), 4_530);
    assert_eq!(loan.get(Attribute::EmploymentLength), 11);
    assert_eq!(loan.get(Attribute::HomeOwnership), 0b1);
    assert_eq!(loan.get(Attribute::IncomeValidated), 0b10);
    assert_eq!(loan.get(Attribute::LoanPurpose), 0b1000);
    assert_eq!(loan.get(Attribute::MthsSinceLastDelinq), NEVER_DELINQUENT);
    assert_eq!(loan.get(Attribute::AddrState), 1 << 4);
    // Jan-2000 to Jul-2014
    assert_eq!(loan.get(Attribute::EarliestCreditLine), 174);
    assert_eq!(loan.get(Attribute::DescWordCount), 5);

    let summary = &dataset.summaries()[0];
    assert_eq!(summary.annual_rate, 12.5);
    assert!(!summary.defaulted);
    assert!(summary.profit > 0.0);
}

#[test]
fn charged_off_loan_is_simulated_as_default() {
    let catalog = catalog();
    let loader = LoanDataLoader::new(&catalog, 120, 25.0, reference_date());
    let dataset = loader
        .load_reader(export(&[LoanRow::charged_off(1)]).as_bytes())
        .unwrap();

    let summary = &dataset.summaries()[0];
    assert!(summary.defaulted);
    assert!(summary.lost > 0.0);
    assert!(summary.profit < 0.0);
}

#[test]
fn unknown_category_aborts_the_load() {
    let rows = vec![
        LoanRow::paid(1),
        LoanRow::paid(2).with(|row| row.purpose = "yacht".to_string()),
    ];
    let catalog = catalog();
    let loader = LoanDataLoader::new(&catalog, 120, 25.0, reference_date());
    let result = loader.load_reader(export(&rows).as_bytes());

    match result {
        Err(LoanBacktestError::UnknownCategory { token, .. }) => assert_eq!(token, "yacht"),
        other => panic!("expected unknown category, got {:?}", other.map(|d| d.len())),
    }
}

#[test]
fn non_finite_payment_aborts_the_load() {
    let rows = vec![LoanRow::paid(1).with(|row| row.total_pymnt = "NaN".to_string())];
    let catalog = catalog();
    let loader = LoanDataLoader::new(&catalog, 120, 25.0, reference_date());
    let result = loader.load_reader(export(&rows).as_bytes());
    assert!(matches!(result, Err(LoanBacktestError::NumberParsing(_))));
}

#[test]
fn volume_month_follows_young_cutoff() {
    let catalog = catalog();
    let loader = LoanDataLoader::new(&catalog, 120, 25.0, reference_date());
    let dataset = loader.load_reader(export(&[]).as_bytes()).unwrap();
    assert!(dataset.is_empty());
    assert_eq!(dataset.volume_month().year, 2014);
    assert_eq!(dataset.volume_month().month, 2);
}

#[test]
fn load_path_reads_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(export(&[LoanRow::paid(1), LoanRow::paid(2)]).as_bytes())
        .unwrap();

    let catalog = catalog();
    let loader = LoanDataLoader::new(&catalog, 120, 25.0, reference_date());
    let dataset = loader.load_path(file.path()).unwrap();
    assert_eq!(dataset.len(), 2);
    dataset.log_averages(&catalog);
}

#[test]
fn missing_file_is_an_io_error() {
    let catalog = catalog();
    let loader = LoanDataLoader::new(&catalog, 120, 25.0, reference_date());
    let dir = tempfile::tempdir().unwrap();
    let result = loader.load_path(dir.path().join("missing.csv"));
    assert!(matches!(result, Err(LoanBacktestError::Io(_))));
}
