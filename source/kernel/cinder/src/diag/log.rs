// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Minimal structured logging with severity levels
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests below; exercised by every kernel module
//! PUBLIC API: log_* macros, emit(level,target,args), set_max_level, install_sink, drain_lines
//! DEPENDS_ON: spin::Mutex (line ring)
//! INVARIANTS: Debug/Trace only in debug builds; single-line emission; ring never exceeds RING_CAPACITY

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Arguments, Write};
use core::sync::atomic::{AtomicU8, Ordering};

use spin::Mutex;

/// Logging severity used by the kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    const fn tag(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    fn enabled(self) -> bool {
        let build_ok = match self {
            Level::Debug | Level::Trace => cfg!(debug_assertions),
            _ => true,
        };
        build_ok && (self as u8) <= MAX_LEVEL.load(Ordering::Relaxed)
    }
}

const RING_CAPACITY: usize = 256;

static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static RING: Mutex<VecDeque<String>> = Mutex::new(VecDeque::new());
static SINK: Mutex<Option<fn(&str)>> = Mutex::new(None);

/// Sets the most verbose level that is still emitted.
pub fn set_max_level(level: Level) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Installs a function that receives every emitted line (e.g. a host console).
pub fn install_sink(sink: fn(&str)) {
    *SINK.lock() = Some(sink);
}

/// Removes and returns the buffered lines, oldest first.
pub fn drain_lines() -> Vec<String> {
    RING.lock().drain(..).collect()
}

/// Emits a structured log line if the level is enabled for the current build.
pub fn emit(level: Level, target: &'static str, args: Arguments<'_>) {
    if !level.enabled() {
        return;
    }

    let mut line = String::new();
    let _ = write!(line, "[{} {}] ", level.tag(), target);
    let _ = line.write_fmt(args);

    if let Some(sink) = *SINK.lock() {
        sink(&line);
    }
    let mut ring = RING.lock();
    if ring.len() == RING_CAPACITY {
        ring.pop_front();
    }
    ring.push_back(line);
}

#[macro_export]
macro_rules! log_error {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Error, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Error, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_warn {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Warn, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Warn, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_info {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Info, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Info, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_debug {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Debug, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Debug, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_trace {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Trace, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Trace, module_path!(), format_args!($($arg)+));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_level_and_target() {
        emit(Level::Warn, "logtest", format_args!("ring {}", 7));
        let lines = drain_lines();
        assert!(lines.iter().any(|l| l == "[WARN logtest] ring 7"));
    }

    #[test]
    fn disabled_levels_are_dropped() {
        emit(Level::Trace, "logtest-quiet", format_args!("hidden"));
        assert!(!RING.lock().iter().any(|l| l.contains("logtest-quiet")));
    }
}
