//! The daemon event loop.
//!
//! One cooperative loop owns the manager and with it every piece of
//! mutable state: backend callbacks, fd readiness and timer ticks all
//! run here, one at a time. Nothing else touches the tree or the
//! scheduler queues, so no operation observes them half-updated.

use std::future;
use std::time::Instant;

use tokio::signal;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::fdwatch::{FdReady, FdWatcher};
use crate::manager::XponManager;
use crate::pon_ctrl::BackendEvent;

/// Runs the loop until ctrl-c or until the backend event channel
/// closes.
pub async fn run(mut manager: XponManager, mut events: mpsc::Receiver<BackendEvent>) {
    let (mut fd_watcher, mut fd_ready) = FdWatcher::new();
    info!("entering event loop");
    loop {
        let deadline = manager.next_deadline();
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => handle_backend_event(&mut manager, &mut fd_watcher, event).await,
                None => {
                    warn!("backend event channel closed, stopping");
                    break;
                }
            },
            ready = fd_ready.recv() => {
                if let Some(FdReady { fd, done }) = ready {
                    manager.pon_ctrl.handle_file_descriptor(fd).await;
                    let _ = done.send(());
                }
            }
            _ = sleep_until_deadline(deadline) => {
                run_due_ticks(&mut manager).await;
            }
            _ = signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }
    fd_watcher.clear();
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(time::Instant::from_std(deadline)).await,
        None => future::pending().await,
    }
}

async fn run_due_ticks(manager: &mut XponManager) {
    let now = Instant::now();
    if manager.discovery.next_deadline().is_some_and(|d| d <= now) {
        manager.discovery_tick().await;
    }
    if manager.discovery.next_sweep_deadline().is_some_and(|d| d <= now) {
        manager.sweep_tick().await;
    }
    if manager.enable_sched.next_deadline().is_some_and(|d| d <= now) {
        manager.enable_tick().await;
    }
}

async fn handle_backend_event(
    manager: &mut XponManager,
    fd_watcher: &mut FdWatcher,
    event: BackendEvent,
) {
    match event {
        BackendEvent::InstanceAdded(args) => {
            if let Err(e) = manager.add_instance(args).await {
                error!("add_instance: {}", e);
            }
        }
        BackendEvent::InstanceRemoved(args) => {
            if let Err(e) = manager.remove_instance(args).await {
                error!("remove_instance: {}", e);
            }
        }
        BackendEvent::ObjectChanged(args) => {
            if let Err(e) = manager.change_object(args).await {
                error!("change_object: {}", e);
            }
        }
        BackendEvent::AddOrChangeInstance(args) => {
            if let Err(e) = manager.add_or_change_instance(args).await {
                error!("add_or_change_instance: {}", e);
            }
        }
        BackendEvent::OmciResetMib { index } => {
            if let Err(e) = manager.reset_mib(index).await {
                error!("reset_mib: {}", e);
            }
        }
        BackendEvent::SetSchemaParameter(args) => {
            if let Err(e) = manager.set_schema_parameter(args).await {
                error!("set_schema_parameter: {}", e);
            }
        }
        BackendEvent::GetParamValue { path, name, reply } => {
            let value = manager.get_param(&path, &name).await;
            if reply.send(value).is_err() {
                debug!("get_param reply receiver dropped");
            }
        }
        BackendEvent::WatchFdStart { fd } => fd_watcher.watch(fd),
        BackendEvent::WatchFdStop { fd } => fd_watcher.unwatch(fd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pon_ctrl::mock::MockBackend;
    use crate::pon_ctrl::InstanceArgs;
    use std::collections::BTreeMap;
    use std::io::{pipe, Write};
    use std::os::fd::AsRawFd;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;
    use xpon_dm::Value;

    #[tokio::test]
    async fn test_loop_serves_events_until_the_channel_closes() {
        let manager = XponManager::for_tests();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run(manager, rx));

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(BackendEvent::GetParamValue {
            path: "XPON".to_string(),
            name: "FsmState".to_string(),
            reply: reply_tx,
        })
        .await
        .unwrap();
        assert_eq!(reply_rx.await.unwrap().unwrap(), Value::from(""));

        drop(tx);
        timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_backend_events_reach_the_operations() {
        let mut manager = XponManager::for_tests();
        let (mut fd_watcher, _fd_ready) = FdWatcher::new();

        let mut keys = BTreeMap::new();
        keys.insert("Name".to_string(), Value::from("onu1"));
        let event = BackendEvent::InstanceAdded(InstanceArgs {
            path: Some("XPON.ONU".to_string()),
            index: Some(1),
            keys: Some(keys),
            ..Default::default()
        });
        handle_backend_event(&mut manager, &mut fd_watcher, event).await;
        assert!(manager.tree.instance_exists("XPON.ONU", 1));

        // A failing operation is logged, never propagated.
        let event = BackendEvent::InstanceAdded(InstanceArgs::default());
        handle_backend_event(&mut manager, &mut fd_watcher, event).await;
    }

    #[tokio::test]
    async fn test_fd_watch_events_route_to_the_watcher() {
        let mut manager = XponManager::for_tests();
        let (mut fd_watcher, mut fd_ready) = FdWatcher::new();
        let (reader, mut writer) = pipe().unwrap();
        let fd = reader.as_raw_fd();

        let event = BackendEvent::WatchFdStart { fd };
        handle_backend_event(&mut manager, &mut fd_watcher, event).await;
        writer.write_all(b"x").unwrap();
        let ready = fd_ready.recv().await.unwrap();
        assert_eq!(ready.fd, fd);
        ready.done.send(()).unwrap();

        let event = BackendEvent::WatchFdStop { fd };
        handle_backend_event(&mut manager, &mut fd_watcher, event).await;
    }

    #[tokio::test]
    async fn test_due_ticks_run_their_sweeps() {
        let config = Config {
            reboot_persist_dir: None,
            upgrade_persist_dir: None,
            short_timeout_ms: 0,
            ..Config::default()
        };
        let mut manager = XponManager::new(config).unwrap();
        let backend = MockBackend::new();
        let handle = backend.handle();
        manager
            .pon_ctrl
            .attach("mock".to_string(), Box::new(backend));

        manager.schedule_enable("XPON.ONU.1.ANI.1");
        assert!(manager.next_deadline().is_some());
        run_due_ticks(&mut manager).await;

        assert_eq!(
            handle.lock().unwrap().enable_calls(),
            vec![("XPON.ONU.1.ANI.1".to_string(), true)]
        );
        assert!(manager.next_deadline().is_none());
    }
}
