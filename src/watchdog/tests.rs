//! Tests for the watchdog module
//!
//! Checks that drive real child processes share one lock: the supervisor
//! reaps with `waitpid(-1)`, so two such tests running in parallel would
//! steal each other's children.

#[cfg(test)]
mod process_tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, MutexGuard};
    use std::time::Duration;

    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::waitpid;
    use nix::unistd::Pid;
    use tempfile::TempDir;

    use crate::watchdog::process::{STDERR_LOG, STDOUT_LOG};
    use crate::watchdog::{
        CheckVerdict, HealthFailure, InvocationMode, ProcessSupervisor, SupervisorConfig,
        TestBinary,
    };

    static CHILD_PROCESSES: Mutex<()> = Mutex::new(());

    fn exclusive() -> MutexGuard<'static, ()> {
        CHILD_PROCESSES.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn supervisor(log_dir: &Path) -> ProcessSupervisor {
        ProcessSupervisor::new(SupervisorConfig {
            log_dir: log_dir.to_path_buf(),
            tick_interval: Duration::from_secs(2),
            soft_reboot: false,
            max_tracked_processes: None,
        })
    }

    #[test]
    fn test_successful_binary_passes_and_is_reaped() {
        let _guard = exclusive();
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "ok.sh", "exit 0");
        let mut sup = supervisor(temp.path());

        let verdict = sup.run_check(&TestBinary::new(&script)).unwrap();
        assert_eq!(verdict, CheckVerdict::Pass);
        assert!(sup.registry().is_empty());
    }

    #[test]
    fn test_exit_code_becomes_failure() {
        let _guard = exclusive();
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "fail.sh", "exit 3");
        let mut sup = supervisor(temp.path());

        let verdict = sup.run_check(&TestBinary::new(&script)).unwrap();
        assert_eq!(verdict, CheckVerdict::Fail(HealthFailure::ExitCode(3)));
        assert!(sup.registry().is_empty());
    }

    #[test]
    fn test_signal_death_becomes_failure() {
        let _guard = exclusive();
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "crash.sh", "kill -9 $$");
        let mut sup = supervisor(temp.path());

        let verdict = sup.run_check(&TestBinary::new(&script)).unwrap();
        assert_eq!(
            verdict,
            CheckVerdict::Fail(HealthFailure::KilledBySignal(Signal::SIGKILL as i32))
        );
        assert!(sup.registry().is_empty());
    }

    #[test]
    fn test_realtime_signal_death_becomes_failure() {
        let _guard = exclusive();
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "rt-crash.sh", "kill -s 34 $$");

        for soft_reboot in [false, true] {
            let mut sup = ProcessSupervisor::new(SupervisorConfig {
                log_dir: temp.path().to_path_buf(),
                tick_interval: Duration::from_secs(2),
                soft_reboot,
                max_tracked_processes: None,
            });

            let verdict = sup.run_check(&TestBinary::new(&script)).unwrap();
            assert_eq!(verdict, CheckVerdict::Fail(HealthFailure::KilledBySignal(34)));
            assert!(sup.registry().is_empty());
        }
    }

    #[test]
    fn test_running_binary_passes_then_times_out() {
        let _guard = exclusive();
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "slow.sh", "exec sleep 30");
        let binary = TestBinary::new(&script).with_timeout(5);
        let mut sup = supervisor(temp.path());

        assert_eq!(sup.run_check(&binary).unwrap(), CheckVerdict::Pass);
        let record = sup.registry().iter().next().cloned().unwrap();

        // Backdate the launch so the record is past its limit
        sup.registry_mut().remove(record.pid);
        sup.registry_mut().add_at(&record.name, record.pid, 0).unwrap();

        let verdict = sup.run_check(&binary).unwrap();
        assert_eq!(verdict, CheckVerdict::Fail(HealthFailure::TimedOut { limit_secs: 5 }));
        assert!(sup.registry().is_empty());

        // The supervisor never signals the stale child; clean it up here
        let pid = Pid::from_raw(record.pid as i32);
        kill(pid, Signal::SIGKILL).unwrap();
        waitpid(pid, None).unwrap();
    }

    #[test]
    fn test_invocation_modes() {
        let _guard = exclusive();
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "mode.sh", "[ \"$1\" = test ] || exit 22");
        let mut sup = supervisor(temp.path());

        let repair_style = TestBinary::new(&script).with_mode(InvocationMode::TestArgument);
        assert_eq!(sup.run_check(&repair_style).unwrap(), CheckVerdict::Pass);

        let bare = TestBinary::new(&script);
        assert_eq!(
            sup.run_check(&bare).unwrap(),
            CheckVerdict::Fail(HealthFailure::ExitCode(22))
        );
    }

    #[test]
    fn test_output_is_appended_to_shared_logs() {
        let _guard = exclusive();
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "chatty.sh", "echo hello\necho oops >&2");
        let mut sup = supervisor(temp.path());

        sup.run_check(&TestBinary::new(&script)).unwrap();
        sup.run_check(&TestBinary::new(&script)).unwrap();

        let stdout = std::fs::read_to_string(temp.path().join(STDOUT_LOG)).unwrap();
        let stderr = std::fs::read_to_string(temp.path().join(STDERR_LOG)).unwrap();
        assert_eq!(stdout, "hello\nhello\n");
        assert_eq!(stderr, "oops\noops\n");
    }

    #[test]
    fn test_missing_binary_reports_errno() {
        let _guard = exclusive();
        let temp = TempDir::new().unwrap();
        let mut sup = supervisor(temp.path());

        let verdict = sup
            .run_check(&TestBinary::new(temp.path().join("does-not-exist")))
            .unwrap();
        assert_eq!(verdict, CheckVerdict::Fail(HealthFailure::ExitCode(libc_enoent())));
        assert!(sup.registry().is_empty());
    }

    #[test]
    fn test_unwritable_log_dir_reports_errno() {
        let _guard = exclusive();
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "ok.sh", "exit 0");
        let mut sup = supervisor(&temp.path().join("missing-dir"));

        let verdict = sup.run_check(&TestBinary::new(&script)).unwrap();
        assert_eq!(verdict, CheckVerdict::Fail(HealthFailure::ExitCode(libc_enoent())));
    }

    fn libc_enoent() -> i32 {
        nix::errno::Errno::ENOENT as i32
    }
}

#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;
    use std::collections::HashMap;

    use crate::watchdog::{ProcessRegistry, TimeoutCheck};

    /// **Property 4: Registry Mirrors Live Children**
    /// *For any* sequence of adds and removes with distinct pids, the registry
    /// holds exactly the pids added and not yet removed.
    mod property_4_registry_model {
        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add { name: u8, pid: u32 },
            Remove { pid: u32 },
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..4, 1u32..64).prop_map(|(name, pid)| Op::Add { name, pid }),
                (1u32..64).prop_map(|pid| Op::Remove { pid }),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn registry_matches_model(ops in prop::collection::vec(op_strategy(), 0..64)) {
                let mut registry = ProcessRegistry::new();
                let mut model: HashMap<u32, String> = HashMap::new();

                for op in ops {
                    match op {
                        Op::Add { name, pid } => {
                            let name = format!("/bin/check-{}", name);
                            registry.add_at(&name, pid, 0).unwrap();
                            model.insert(pid, name);
                        }
                        Op::Remove { pid } => {
                            let removed = registry.remove(pid).map(|r| r.name);
                            prop_assert_eq!(removed, model.remove(&pid));
                        }
                    }
                }

                prop_assert_eq!(registry.len(), model.len());
                for (pid, name) in &model {
                    prop_assert_eq!(&registry.get(*pid).unwrap().name, name);
                }
            }
        }
    }

    /// **Property 5: Bounded Timeout Eviction**
    /// *For any* set of records, one timeout check removes at most one
    /// record, and only one of the queried name that is strictly over the limit.
    mod property_5_timeout_eviction {
        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn evicts_at_most_one_stale_record(
                launches in prop::collection::vec((0u8..3, 0u64..100), 0..24),
                timeout in 0u64..50,
                now in 50u64..150,
            ) {
                let mut registry = ProcessRegistry::new();
                for (pid, (name, at)) in launches.iter().enumerate() {
                    registry.add_at(&format!("bin-{}", name), pid as u32 + 1, *at).unwrap();
                }
                let before = registry.len();
                let stale_before = registry
                    .iter()
                    .filter(|r| r.name == "bin-0" && now - r.launched_at.min(now) > timeout)
                    .count();

                match registry.check_timeout_at("bin-0", timeout, now) {
                    TimeoutCheck::Expired(record) => {
                        prop_assert_eq!(record.name.as_str(), "bin-0");
                        prop_assert!(now.saturating_sub(record.launched_at) > timeout);
                        prop_assert_eq!(registry.len(), before - 1);
                        prop_assert!(!registry.contains(record.pid));
                    }
                    TimeoutCheck::Ok => {
                        prop_assert_eq!(stale_before, 0);
                        prop_assert_eq!(registry.len(), before);
                    }
                }
            }
        }
    }
}
