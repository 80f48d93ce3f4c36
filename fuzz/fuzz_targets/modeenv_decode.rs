#![no_main]

// Any modeenv that decodes must survive an encode/decode cycle unchanged,
// including keys the crate does not own.

use bootstate_core::modeenv::Modeenv;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|bytes: &[u8]| {
    let Ok(modeenv) = Modeenv::from_slice(bytes) else {
        return;
    };
    let encoded = modeenv.to_vec().unwrap();
    let again = Modeenv::from_slice(&encoded).unwrap();
    assert_eq!(again, modeenv);
    let _ = serde_json::from_slice::<serde_json::Value>(&encoded).unwrap();
});
