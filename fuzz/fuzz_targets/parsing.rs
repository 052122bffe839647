#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = brine::value_from_slice(data, brine::DeOptions::new().max_operand_len(1 << 20));
});
