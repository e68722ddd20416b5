mod common;

use common::{machine, other_machine, serial_secret, unlock_secret, KNOWN_SERIAL, KNOWN_UNLOCK};
use proptest::prelude::*;
use tablepos_license::codec::{
    constant_time_eq, normalize_code, SERIAL_CODE_LEN, SHORT_CODE_LEN,
};
use tablepos_license::{
    derive_serial_code, derive_unlock_code, generate_one_time_code, verify_serial_code,
    verify_unlock_code, CodeSecret,
};
use tablepos_types::MachineId;

// ── Serial codes ─────────────────────────────────────────────────

#[test]
fn serial_matches_reference_hmac() {
    let serial = derive_serial_code(&machine(), &serial_secret()).unwrap();
    assert_eq!(serial, KNOWN_SERIAL);
}

#[test]
fn serial_format() {
    let serial = derive_serial_code(&machine(), &serial_secret()).unwrap();
    assert_eq!(serial.len(), SERIAL_CODE_LEN);
    assert_eq!(SERIAL_CODE_LEN, 23);
    let groups: Vec<&str> = serial.split('-').collect();
    assert_eq!(groups.len(), 4);
    for group in groups {
        assert_eq!(group.len(), 5);
        assert!(group.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}

#[test]
fn serial_ignores_machine_id_case() {
    let lower = MachineId::parse("a1b2c3d4e5f60718").unwrap();
    let upper = MachineId::parse("A1B2C3D4E5F60718").unwrap();
    assert_eq!(
        derive_serial_code(&lower, &serial_secret()).unwrap(),
        derive_serial_code(&upper, &serial_secret()).unwrap()
    );
}

#[test]
fn serial_depends_on_secret() {
    let a = derive_serial_code(&machine(), &serial_secret()).unwrap();
    let b = derive_serial_code(&machine(), &CodeSecret::new("rotated")).unwrap();
    assert_ne!(a, b);
}

#[test]
fn verify_serial_accepts_lowercase_and_whitespace() {
    let candidate = format!("  {}  ", KNOWN_SERIAL.to_lowercase());
    assert!(verify_serial_code(&candidate, &machine(), &serial_secret()).unwrap());
}

#[test]
fn verify_serial_rejects_other_machine() {
    assert!(!verify_serial_code(KNOWN_SERIAL, &other_machine(), &serial_secret()).unwrap());
}

#[test]
fn verify_serial_rejects_truncated() {
    assert!(!verify_serial_code(&KNOWN_SERIAL[..22], &machine(), &serial_secret()).unwrap());
}

#[test]
fn rotating_secret_invalidates_serial() {
    let rotated = CodeSecret::new("new-serial-secret");
    assert!(!verify_serial_code(KNOWN_SERIAL, &machine(), &rotated).unwrap());
}

// ── Unlock codes ─────────────────────────────────────────────────

#[test]
fn unlock_matches_reference_hmac() {
    let unlock = derive_unlock_code(&machine(), &unlock_secret()).unwrap();
    assert_eq!(unlock, KNOWN_UNLOCK);
    assert_eq!(unlock.len(), SHORT_CODE_LEN);
}

#[test]
fn unlock_uses_independent_secret() {
    let unlock = derive_unlock_code(&machine(), &unlock_secret()).unwrap();
    let serial = derive_serial_code(&machine(), &serial_secret()).unwrap();
    assert_ne!(unlock, serial.replace('-', "")[..8]);
}

#[test]
fn verify_unlock() {
    assert!(verify_unlock_code("ce009ba9", &machine(), &unlock_secret()).unwrap());
    assert!(!verify_unlock_code("CE009BA8", &machine(), &unlock_secret()).unwrap());
    assert!(!verify_unlock_code(KNOWN_UNLOCK, &machine(), &serial_secret()).unwrap());
}

// ── One-time codes ───────────────────────────────────────────────

#[test]
fn one_time_code_shape() {
    let code = generate_one_time_code();
    assert_eq!(code.len(), SHORT_CODE_LEN);
    assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
}

#[test]
fn one_time_codes_are_random() {
    let codes: std::collections::HashSet<String> =
        (0..64).map(|_| generate_one_time_code()).collect();
    assert!(codes.len() > 60);
}

// ── Helpers ──────────────────────────────────────────────────────

#[test]
fn normalize() {
    assert_eq!(normalize_code("  ab12cd34\n"), "AB12CD34");
}

#[test]
fn constant_time_eq_behaves_like_eq() {
    assert!(constant_time_eq("ABCD", "ABCD"));
    assert!(!constant_time_eq("ABCD", "ABCE"));
    assert!(!constant_time_eq("ABCD", "ABCDE"));
    assert!(!constant_time_eq("", "A"));
}

// ── Properties ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn serial_is_deterministic(id in "[0-9A-F]{8,32}") {
        let machine_id = MachineId::parse(&id).unwrap();
        let a = derive_serial_code(&machine_id, &serial_secret()).unwrap();
        let b = derive_serial_code(&machine_id, &serial_secret()).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert!(verify_serial_code(&a, &machine_id, &serial_secret()).unwrap());
    }

    #[test]
    fn distinct_machines_get_distinct_serials(a in "[0-9A-F]{16}", b in "[0-9A-F]{16}") {
        prop_assume!(a != b);
        let ma = MachineId::parse(&a).unwrap();
        let mb = MachineId::parse(&b).unwrap();
        prop_assert_ne!(
            derive_serial_code(&ma, &serial_secret()).unwrap(),
            derive_serial_code(&mb, &serial_secret()).unwrap()
        );
    }
}
