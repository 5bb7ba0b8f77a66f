//! Bridge from `privfs_config::Config` to the domain types of the other
//! crates. The config crate depends on none of them, so every conversion
//! happens here, once.

use std::path::PathBuf;

use privfs_bus::{NatsSettings, StreamSpec, Subjects, Timeouts};
use privfs_config::Config;
use privfs_core::Transport;
use privfs_telemetry::{LogConfig, LogFormat, LogTarget};

use crate::runtime::WorkerOptions;

/// Convert config to [`NatsSettings`].
#[must_use]
pub fn to_nats_settings(cfg: &Config) -> NatsSettings {
    NatsSettings {
        url: cfg.broker.url.clone(),
        user: cfg.broker.user.clone(),
        password: cfg.broker.password.clone(),
        reconnect_wait: cfg.broker.reconnect_wait(),
        client_name: cfg.broker.client_name.clone(),
    }
}

/// Convert config to [`Subjects`].
#[must_use]
pub fn to_subjects(cfg: &Config) -> Subjects {
    Subjects::new(&cfg.subjects.root, &cfg.subjects.events_root)
}

/// Work-queue declaration: every task verb's subject bound to one stream.
#[must_use]
pub fn to_stream_spec(cfg: &Config) -> StreamSpec {
    StreamSpec {
        stream: cfg.subjects.stream.clone(),
        subjects: to_subjects(cfg).for_transport(Transport::Task),
        consumer: cfg.subjects.consumer.clone(),
        max_deliver: cfg.queue.max_deliver,
    }
}

/// Caller-side deadlines for [`privfs_bus::FsClient`].
#[must_use]
pub fn to_timeouts(cfg: &Config) -> Timeouts {
    Timeouts {
        sync: cfg.timeouts.sync(),
        binary: cfg.timeouts.binary(),
    }
}

/// Convert config to [`LogConfig`]. `verbose` forces the `debug` level.
#[must_use]
pub fn to_log_config(cfg: &Config, verbose: bool) -> LogConfig {
    // Validation already rejected unknown formats.
    let format = cfg
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or_default();

    let target = match cfg.logging.target.as_str() {
        "stdout" => LogTarget::Stdout,
        "file" => LogTarget::File(PathBuf::from(
            cfg.logging.directory.as_deref().unwrap_or("."),
        )),
        _ => LogTarget::Stderr,
    };

    let level = if verbose { "debug" } else { cfg.logging.level.as_str() };
    let mut log_config = LogConfig::new(level)
        .with_format(format)
        .with_target(target);

    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}

/// Convert config to [`WorkerOptions`].
#[must_use]
pub fn to_worker_options(cfg: &Config) -> WorkerOptions {
    WorkerOptions {
        subjects: to_subjects(cfg),
        stream: to_stream_spec(cfg),
        fetch_wait: cfg.queue.fetch_wait(),
        fetch_backoff: cfg.queue.fetch_backoff(),
        sweep_interval: cfg.uploads.sweep_interval(),
    }
}
