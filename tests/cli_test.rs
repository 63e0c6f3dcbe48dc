mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::write_script;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

#[test]
fn test_cli_purchase_and_pending_flow() {
    let script = write_script(&[
        "stock, A, , non-consumable:4.99",
        "stock, B, , non-consumable",
        "load, , , A|B",
        "purchase, A",
        "respond, B, , pending",
        "purchase, B",
        "deliver, B, 2",
        "unfinished",
    ]);

    let mut cmd = Command::new(cargo_bin!("iap-reconciler"));
    cmd.arg(script.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""report":"catalog","productIds":["A","B"]"#))
        .stdout(predicate::str::contains(r#""event":"purchase-updated""#))
        .stdout(predicate::str::contains(r#""productId":"A","transactionId":"1""#))
        .stdout(predicate::str::contains(r#""code":"PURCHASE_PENDING""#))
        .stdout(predicate::str::contains(r#""report":"unfinished","transactionIds":[]"#));
}

#[test]
fn test_cli_malformed_rows_are_skipped() {
    let script = write_script(&[
        "stock, A, , non-consumable",
        "refund, A",
        "finish, , not-a-number",
        "finish",
        "can-pay",
    ]);

    let mut cmd = Command::new(cargo_bin!("iap-reconciler"));
    cmd.arg(script.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading step 2"))
        .stderr(predicate::str::contains("Error reading step 3"))
        .stderr(predicate::str::contains("Error running step 4"))
        .stdout(predicate::str::contains(r#""report":"can-pay","enabled":true"#));
}

#[test]
fn test_cli_unmatched_flag_finishes_mismatched_purchase() {
    let rows = [
        "stock, A, , non-consumable",
        "stock, B, , non-consumable",
        "load, , , A|B",
        "respond, A, , mismatch:B",
        "purchase, A",
        "unfinished",
    ];

    let script = write_script(&rows);
    Command::new(cargo_bin!("iap-reconciler"))
        .arg(script.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""code":"PRODUCT_ID_MISMATCH""#))
        .stdout(predicate::str::contains(r#""transactionIds":[1]"#));

    let script = write_script(&rows);
    Command::new(cargo_bin!("iap-reconciler"))
        .arg(script.path())
        .args(["--unmatched", "finish-and-report"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""code":"PRODUCT_ID_MISMATCH""#))
        .stdout(predicate::str::contains(r#""transactionIds":[]"#));
}

#[test]
fn test_cli_config_file_and_disabled_payments() {
    let script = write_script(&[
        "stock, coins, , consumable",
        "load, coins",
        "can-pay, , , off",
        "purchase, coins, , 2",
    ]);

    Command::new(cargo_bin!("iap-reconciler"))
        .arg(script.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""report":"rejected","op":"purchase""#))
        .stdout(predicate::str::contains(r#""code":"DEVELOPER_ERROR""#));

    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, r#"{{ "require_payments_enabled": false }}"#).unwrap();
    Command::new(cargo_bin!("iap-reconciler"))
        .arg(script.path())
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""productId":"coins""#))
        .stdout(predicate::str::contains("rejected").not());
}

#[test]
fn test_cli_promoted_product_and_restore() {
    let script = write_script(&[
        "stock, pro, , subscription:9.99",
        "stock, A, , non-consumable",
        "restore",
        "promote, A",
        "promote, pro",
        "buy-promoted",
        "buy-promoted",
        "outage, , , on",
        "restore",
        "outage, , , off",
        "restore",
    ]);

    let mut cmd = Command::new(cargo_bin!("iap-reconciler"));
    cmd.arg(script.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"never-purchased""#))
        .stdout(predicate::str::contains(r#""event":"iap-promoted-product","payload":{"intentId":"intent-2","productId":"pro"}"#))
        .stdout(predicate::str::contains(r#""productId":"pro","transactionId":"1""#))
        .stdout(predicate::str::contains(r#""op":"buy-promoted""#))
        .stdout(predicate::str::contains(r#""status":"failure""#))
        .stdout(predicate::str::contains(r#""status":"active""#));
}

#[test]
fn test_cli_missing_file() {
    let mut cmd = Command::new(cargo_bin!("iap-reconciler"));
    cmd.arg("does-not-exist.csv");
    cmd.assert().failure();
}
