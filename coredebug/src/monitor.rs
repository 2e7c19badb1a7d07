//! Diagnostic monitor commands.
//!
//! Monitor commands give raw access to the core, bypassing the register cache. They are meant
//! for debugging the debugger and the target hardware, e.g. from a `monitor` command of a
//! debugger frontend.

use std::fmt::Write as _;

use crate::{Core, Error, RegisterKind, RegisterRef};

struct MonitorCommand {
    command: &'static str,
    args: &'static str,
    help_text: &'static str,
    requires_target_halted: bool,
    handler: fn(&mut Core<'_>, &[&str]) -> Result<String, Error>,
}

static MONITOR_COMMANDS: &[MonitorCommand] = &[
    MonitorCommand {
        command: "core_reg",
        args: "<number> [value]",
        help_text: "Read or write a core register, bypassing the register cache.",
        requires_target_halted: true,
        handler: core_register,
    },
    MonitorCommand {
        command: "aux_reg",
        args: "<number> [value]",
        help_text: "Read or write an auxiliary register, bypassing the register cache.",
        requires_target_halted: true,
        handler: aux_register,
    },
    MonitorCommand {
        command: "dcache_flush",
        args: "[on|off]",
        help_text: "Show or change whether the data cache is flushed before memory reads.",
        requires_target_halted: false,
        handler: dcache_flush,
    },
    MonitorCommand {
        command: "invalidate_caches",
        args: "",
        help_text: "Invalidate the instruction and data caches.",
        requires_target_halted: true,
        handler: invalidate_caches,
    },
    MonitorCommand {
        command: "help",
        args: "",
        help_text: "List the available monitor commands.",
        requires_target_halted: false,
        handler: help,
    },
];

/// Run a monitor command line and return its output.
///
/// Unknown commands and malformed arguments are reported as [`Error::SyntaxError`].
#[tracing::instrument(skip(core))]
pub fn run_monitor_command(core: &mut Core<'_>, line: &str) -> Result<String, Error> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Err(Error::SyntaxError("empty monitor command".to_string()));
    };
    let args = words.collect::<Vec<_>>();

    let command = MONITOR_COMMANDS
        .iter()
        .find(|command| command.command == name)
        .ok_or_else(|| {
            Error::SyntaxError(format!("unknown monitor command `{name}`, try `help`"))
        })?;

    if command.requires_target_halted && !core.run_state().is_halted() {
        return Err(Error::NotHalted);
    }

    (command.handler)(core, &args)
}

fn core_register(core: &mut Core<'_>, args: &[&str]) -> Result<String, Error> {
    raw_register(core, RegisterKind::Core, args)
}

fn aux_register(core: &mut Core<'_>, args: &[&str]) -> Result<String, Error> {
    raw_register(core, RegisterKind::Aux, args)
}

fn raw_register(core: &mut Core<'_>, kind: RegisterKind, args: &[&str]) -> Result<String, Error> {
    let (number, value) = match args {
        [number] => (parse_number(number)?, None),
        [number, value] => (parse_number(number)?, Some(parse_number(value)?)),
        _ => {
            return Err(Error::SyntaxError(
                "expected a register number and an optional value".to_string(),
            ))
        }
    };

    let register = RegisterRef { kind, number };
    if core.state().variant().is_reserved(register) {
        return Err(Error::SyntaxError(format!("{register} is reserved")));
    }
    let selector = core.selector();

    match value {
        None => {
            let value = core.transport().read_register(selector, register)?;
            Ok(format!("{register}: {value:#010x}"))
        }
        Some(value) => {
            core.transport().write_register(selector, register, value)?;
            core.forget_register(register);
            Ok(String::new())
        }
    }
}

fn dcache_flush(core: &mut Core<'_>, args: &[&str]) -> Result<String, Error> {
    match args {
        [] => {}
        ["on"] => core.set_dcache_flush(true),
        ["off"] => core.set_dcache_flush(false),
        _ => return Err(Error::SyntaxError("expected `on` or `off`".to_string())),
    }

    let state = if core.dcache_flush_enabled() {
        "on"
    } else {
        "off"
    };
    Ok(format!("dcache_flush is {state}"))
}

fn invalidate_caches(core: &mut Core<'_>, args: &[&str]) -> Result<String, Error> {
    if !args.is_empty() {
        return Err(Error::SyntaxError(
            "invalidate_caches takes no arguments".to_string(),
        ));
    }

    // Force the invalidation even if it already happened during this halt.
    core.reset_cache_state();
    core.invalidate_caches()?;
    Ok(String::new())
}

fn help(_core: &mut Core<'_>, _args: &[&str]) -> Result<String, Error> {
    let mut output = String::new();
    for command in MONITOR_COMMANDS {
        let usage = format!("{} {}", command.command, command.args);
        let _ = writeln!(output, "{:<28} {}", usage.trim_end(), command.help_text);
    }
    Ok(output)
}

fn parse_number(input: &str) -> Result<u32, Error> {
    parse_int::parse::<u32>(input)
        .map_err(|error| Error::SyntaxError(format!("invalid number `{input}`: {error}")))
}
