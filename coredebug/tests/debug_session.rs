use std::time::Duration;

use coredebug::{
    config::{CoreOptions, Registry},
    monitor::run_monitor_command,
    transport::{CoreSelector, MockTransport},
    BreakpointKind, Core, CoreState, DebugReason, RegisterClass, RegisterRef, RunState,
    TargetEvent, WatchpointAccess,
};
use coredebug_target::CoreFamily;

/// A typical session: attach to a running core, plant breakpoints, run into them and inspect
/// the halted core.
#[test]
fn breakpoint_session_on_arc_hs() {
    let registry = Registry::from_builtin_variants().expect("Failed to load builtin variants.");
    let variant = registry
        .variant(CoreFamily::ArcHs)
        .expect("ARC HS is a builtin variant.");

    let mut transport = MockTransport::new(variant.clone());
    transport.load_memory(0x8000, &[0x01, 0x02, 0x03, 0x04]);
    let mut state = CoreState::new(CoreSelector(0), variant, CoreOptions::default());

    // The core runs when we attach, breakpoints wait for the next resume.
    let mut core = Core::new(&mut transport, &mut state);
    assert_eq!(core.poll().unwrap(), None);
    core.add_breakpoint(0x8000, 4, BreakpointKind::Software)
        .unwrap();
    core.add_breakpoint(0x9000, 2, BreakpointKind::Hardware)
        .unwrap();
    assert!(core.breakpoints().iter().all(|breakpoint| !breakpoint.is_set()));

    core.halt().unwrap();
    core.wait_for_core_halted(Duration::from_millis(100))
        .unwrap();
    assert_eq!(core.debug_reason(), DebugReason::DebugRequest);

    core.resume(true, 0, true, false).unwrap();
    assert!(core.breakpoints().iter().all(|breakpoint| breakpoint.is_set()));
    assert_eq!(core.run_state(), RunState::Running);

    assert_eq!(transport.memory(0x8000, 4), vec![0x6f, 0x25, 0x3f, 0x00]);
    transport.hit_trap(0x8000);

    let mut core = Core::new(&mut transport, &mut state);
    assert_eq!(core.poll().unwrap(), Some(TargetEvent::Halted));
    assert_eq!(core.debug_reason(), DebugReason::Breakpoint);

    // Reading memory at the breakpoint shows the trap, removing it brings the code back.
    assert_eq!(
        core.read_memory(0x8000, 1, 4).unwrap(),
        vec![0x6f, 0x25, 0x3f, 0x00]
    );
    core.remove_breakpoint(0x8000).unwrap();
    assert_eq!(
        core.read_memory(0x8000, 4, 1).unwrap(),
        vec![0x01, 0x02, 0x03, 0x04]
    );

    let general = core.register_list(RegisterClass::General);
    let pc = general
        .iter()
        .find(|register| register.name() == "pc")
        .expect("The program counter is a general register.");
    assert_eq!(pc.value(), Some(0x8000));

    core.step(true, 0, true).unwrap();
    assert_eq!(core.debug_reason(), DebugReason::SingleStep);
    assert_eq!(core.read_register(RegisterRef::aux(0x6)).unwrap(), 0x8004);
}

#[test]
fn watchpoint_session_on_rv32_lite() {
    let registry = Registry::from_builtin_variants().expect("Failed to load builtin variants.");
    let variant = registry
        .variant_by_name("rv32_lite")
        .expect("rv32_lite is a builtin variant.");

    let mut transport = MockTransport::new(variant.clone()).with_core(CoreSelector(1));
    let mut state = CoreState::new(CoreSelector(1), variant, CoreOptions::default());

    let mut core = Core::new(&mut transport, &mut state);
    core.halt().unwrap();
    core.add_watchpoint(0x2000_0000, 4, WatchpointAccess::Write)
        .unwrap();
    core.add_watchpoint(0x2000_0010, 4, WatchpointAccess::Read)
        .unwrap();
    assert!(core
        .add_breakpoint(0x100, 4, BreakpointKind::Hardware)
        .is_err());
    core.resume(true, 0, true, false).unwrap();

    transport.hit_comparator(1, 0x340);

    let mut core = Core::new(&mut transport, &mut state);
    core.poll().unwrap();
    assert_eq!(core.debug_reason(), DebugReason::Watchpoint);

    // Without hit bits the core cannot tell which of the two watchpoints matched.
    assert!(core.hit_watchpoint().is_none());

    core.remove_watchpoint(0x2000_0000).unwrap();
    core.add_breakpoint(0x100, 4, BreakpointKind::Hardware)
        .unwrap();
}

#[test]
fn options_and_monitor_commands() {
    let options = CoreOptions::from_yaml_reader(
        "dcache_flush: false\nreset:\n  reset_halt: true\n".as_bytes(),
    )
    .unwrap();
    let registry = Registry::from_builtin_variants().unwrap();
    let variant = registry.variant(CoreFamily::ArcEm).unwrap();

    let mut transport = MockTransport::new(variant.clone());
    let mut state = CoreState::new(CoreSelector(0), variant, options);

    let mut core = Core::new(&mut transport, &mut state);
    assert!(!core.dcache_flush_enabled());
    core.assert_reset().unwrap();
    core.deassert_reset().unwrap();
    assert_eq!(core.run_state(), RunState::Halted);

    assert_eq!(
        run_monitor_command(&mut core, "dcache_flush on").unwrap(),
        "dcache_flush is on"
    );
    run_monitor_command(&mut core, "core_reg 0x2 0xdeadbeef").unwrap();
    assert_eq!(
        core.read_register(RegisterRef::core(2)).unwrap(),
        0xdead_beef
    );
    assert!(run_monitor_command(&mut core, "help")
        .unwrap()
        .contains("invalidate_caches"));
}
