mod common;

use common::{
    AMPERE_ARCH, BLACKWELL_ARCH, CLIENT_HANDLE, DISPLAY_FD, FakeDriver, TEST_UUID, config,
    context, initialized,
};
use nvrm_rs::{ContextState, DeviceContext, DriverConfig, DriverVersion, GpuArch, NvError};

const INIT_SEQUENCE: &[&str] = &[
    "open_control",
    "alloc_client",
    "query_driver_version",
    "query_dev_info",
    "query_device_instance",
    "open_device",
    "alloc_device",
    "alloc_subdevice",
    "query_architecture",
];

const TEARDOWN_SEQUENCE: &[&str] = &["free_object", "free_object", "close", "free_object", "close"];

#[test]
fn initialize_populates_context() {
    let ctx = initialized(BLACKWELL_ARCH);

    assert_eq!(ctx.state(), ContextState::Initialized);
    assert_eq!(ctx.driver().calls(), INIT_SEQUENCE);
    assert!(ctx.is_blackwell());

    let info = ctx.info().unwrap();
    assert_eq!(info.driver_version, DriverVersion { major: 570, minor: 86 });
    assert_eq!(info.gpu_id, 0x100);
    assert_eq!(info.generic_page_kind, 0xfe);
    assert_eq!(info.profile.arch, GpuArch::Blackwell);
    assert!(info.profile.supports_dmabuf_v2);
    assert!(info.profile.supports_low_latency_decode);

    let handles = ctx.handles().unwrap();
    assert_eq!(handles.display_fd, DISPLAY_FD);
    assert_eq!(handles.client, CLIENT_HANDLE);
    assert_ne!(handles.ctl_fd, handles.nv0_fd);
    assert_eq!(ctx.driver().objects().len(), 3);
}

#[test]
fn teardown_releases_in_reverse_order() {
    let mut ctx = initialized(AMPERE_ARCH);
    let before = ctx.driver().call_count();

    ctx.teardown().unwrap();

    assert_eq!(ctx.state(), ContextState::TornDown);
    assert_eq!(&ctx.driver().calls()[before..], TEARDOWN_SEQUENCE);
    assert!(ctx.driver().open_fds().is_empty());
    assert!(ctx.driver().objects().is_empty());
    assert!(ctx.handles().is_none());
}

#[test]
fn second_initialize_is_invalid_state() {
    let mut ctx = initialized(BLACKWELL_ARCH);
    let before = ctx.driver().call_count();

    assert!(matches!(ctx.initialize(DISPLAY_FD), Err(NvError::InvalidState(_))));
    assert_eq!(ctx.driver().call_count(), before);
    assert_eq!(ctx.state(), ContextState::Initialized);
}

#[test]
fn teardown_is_idempotent() {
    let mut ctx = context(BLACKWELL_ARCH);
    ctx.teardown().unwrap();
    assert_eq!(ctx.state(), ContextState::Uninitialized);
    assert_eq!(ctx.driver().call_count(), 0);

    ctx.initialize(DISPLAY_FD).unwrap();
    ctx.teardown().unwrap();
    let after_first = ctx.driver().call_count();
    ctx.teardown().unwrap();
    assert_eq!(ctx.driver().call_count(), after_first);
}

#[test]
fn torn_down_context_cannot_be_reinitialized() {
    let mut ctx = initialized(BLACKWELL_ARCH);
    ctx.teardown().unwrap();
    assert!(matches!(ctx.initialize(DISPLAY_FD), Err(NvError::InvalidState(_))));
    assert_eq!(ctx.state(), ContextState::TornDown);
}

#[test]
fn any_failed_step_rolls_back_everything() {
    for (step, &op) in INIT_SEQUENCE.iter().enumerate() {
        let mut ctx = context(BLACKWELL_ARCH);
        ctx.driver().fail(op, -libc::EIO);

        let err = ctx.initialize(DISPLAY_FD).unwrap_err();
        assert!(
            matches!(err, NvError::Driver { op: failed, code } if failed == op && code == -libc::EIO),
            "step {op}: {err:?}"
        );
        assert_eq!(ctx.state(), ContextState::Uninitialized, "step {op}");
        assert!(ctx.info().is_none());
        assert!(ctx.driver().open_fds().is_empty(), "fd leak after {op}");
        assert!(ctx.driver().objects().is_empty(), "object leak after {op}");
        assert_eq!(&ctx.driver().calls()[..=step], &INIT_SEQUENCE[..=step]);

        // Failure leaves the context usable.
        ctx.driver().clear_failures();
        ctx.initialize(DISPLAY_FD).unwrap();
        assert_eq!(ctx.state(), ContextState::Initialized);
    }
}

#[test]
fn permission_rejection_depends_on_sandbox_host() {
    let sandboxed = DeviceContext::with_driver(FakeDriver::new(BLACKWELL_ARCH), config(true));
    let plain = DeviceContext::with_driver(FakeDriver::new(BLACKWELL_ARCH), config(false));

    for (mut ctx, expect_sandbox) in [(sandboxed, true), (plain, false)] {
        assert_eq!(ctx.is_sandboxed(), expect_sandbox);
        ctx.driver().fail("open_device", -libc::EACCES);
        let err = ctx.initialize(DISPLAY_FD).unwrap_err();
        if expect_sandbox {
            assert!(matches!(err, NvError::SandboxBlocked { op: "open_device" }));
            assert!(!err.is_fatal());
        } else {
            assert!(matches!(err, NvError::UnexpectedDriverRejection { op: "open_device", .. }));
            assert!(err.is_fatal());
        }
        assert!(ctx.driver().open_fds().is_empty());
    }
}

#[test]
fn busy_driver_is_reported_not_retried() {
    let mut ctx = context(BLACKWELL_ARCH);
    ctx.driver().fail("alloc_client", -libc::EAGAIN);

    let err = ctx.initialize(DISPLAY_FD).unwrap_err();
    assert!(matches!(err, NvError::ResourceBusy { op: "alloc_client" }));
    assert!(err.is_retryable());
    let attempts = ctx
        .driver()
        .calls()
        .iter()
        .filter(|&&c| c == "alloc_client")
        .count();
    assert_eq!(attempts, 1);
}

#[test]
fn device_uuid_requires_initialized_context() {
    let mut ctx = context(BLACKWELL_ARCH);
    assert!(matches!(ctx.device_uuid(), Err(NvError::NotInitialized)));
    assert_eq!(ctx.driver().call_count(), 0);

    ctx.initialize(DISPLAY_FD).unwrap();
    assert_eq!(ctx.device_uuid().unwrap(), TEST_UUID);

    ctx.teardown().unwrap();
    assert!(matches!(ctx.device_uuid(), Err(NvError::NotInitialized)));
}

#[test]
fn dev_info_layout_follows_driver_version() {
    let mut ctx = DeviceContext::with_driver(
        FakeDriver::new(AMPERE_ARCH).with_version(535, 183),
        config(false),
    );
    ctx.initialize(DISPLAY_FD).unwrap();
    assert_eq!(
        ctx.driver().dev_info_versions(),
        vec![DriverVersion { major: 535, minor: 183 }]
    );
}

#[test]
fn invalid_large_page_threshold_fails_initialization_cleanly() {
    let mut ctx = DeviceContext::with_driver(
        FakeDriver::new(BLACKWELL_ARCH),
        DriverConfig::new()
            .sandbox_probe(nvrm_rs::SandboxProbe::new(false, None))
            .large_page_threshold(1024),
    );

    assert!(matches!(ctx.initialize(DISPLAY_FD), Err(NvError::InvalidArgument(_))));
    assert_eq!(ctx.state(), ContextState::Uninitialized);
    assert!(ctx.driver().open_fds().is_empty());
    assert!(ctx.driver().objects().is_empty());
}

#[test]
fn failed_release_still_tears_down() {
    let mut ctx = initialized(BLACKWELL_ARCH);
    ctx.driver().fail("close", -libc::EIO);

    let err = ctx.teardown().unwrap_err();
    assert!(matches!(err, NvError::Driver { op: "close_device", .. }));
    assert_eq!(ctx.state(), ContextState::TornDown);
    // Object frees still ran after the failing close.
    assert!(ctx.driver().objects().is_empty());
    assert!(ctx.teardown().is_ok());
}

#[test]
fn dropping_a_live_context_swallows_release_failures() {
    let ctx = initialized(BLACKWELL_ARCH);
    ctx.driver().fail("close", -libc::EIO);
    ctx.driver().fail("free_object", -libc::EIO);
    drop(ctx);
}

#[test]
fn unknown_architecture_still_initializes() {
    let ctx = initialized(0x20);
    assert_eq!(ctx.arch(), Some(GpuArch::Unknown));
    assert!(!ctx.is_blackwell());
}
