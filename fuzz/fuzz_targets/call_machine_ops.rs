//! Fuzz the call lifecycle machine with arbitrary operation sequences.
//!
//! Every operation in every phase must either transition or return a
//! typed error; the machine must never panic and its session must stay
//! consistent with its phase.

#![no_main]

use libfuzzer_sys::fuzz_target;
use voicelink_core::{CallMachine, CallPhase};

fuzz_target!(|ops: Vec<u8>| {
    let mut machine = CallMachine::default();
    for op in ops {
        match op % 11 {
            0 => drop(machine.initiate("12")),
            1 => drop(machine.initiate("")),
            2 => drop(machine.initiated("c1", "4821")),
            3 => drop(machine.confirm("4821")),
            4 => drop(machine.verified(true, 0)),
            5 => drop(machine.verified(false, 0)),
            6 => drop(machine.cancel()),
            7 => machine.tick(),
            8 => drop(machine.end()),
            9 => drop(machine.ended()),
            _ => machine.grace_elapsed(),
        }

        let snapshot = machine.snapshot();
        match machine.phase() {
            CallPhase::Idle | CallPhase::Initiating => assert!(snapshot.call_id.is_none()),
            CallPhase::Initiated | CallPhase::Active | CallPhase::Ended => {
                assert!(snapshot.call_id.is_some());
            }
        }
    }
});
