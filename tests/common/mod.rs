#![allow(dead_code)]

use nvrm_rs::nvrm::{DevInfo, DriverResult, DriverVersion, MemoryRequest, RmClient, RmDriver};
use nvrm_rs::{DeviceContext, DriverConfig, SandboxProbe};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::os::fd::RawFd;

pub const DISPLAY_FD: RawFd = 7;
pub const CLIENT_HANDLE: u32 = 0xC1D0_0001;
pub const BLACKWELL_ARCH: u32 = 0x1B0;
pub const AMPERE_ARCH: u32 = 0x170;
pub const TEST_UUID: [u8; 16] = *b"GPU-0123456789ab";

/// Records every command and tracks the kernel objects and handles it hands out.
#[derive(Debug)]
pub struct FakeDriver {
    pub arch_id: u32,
    pub version: DriverVersion,
    pub dev_info: DevInfo,
    failures: RefCell<HashMap<&'static str, i32>>,
    calls: RefCell<Vec<&'static str>>,
    next_fd: Cell<RawFd>,
    open_fds: RefCell<BTreeSet<RawFd>>,
    objects: RefCell<BTreeSet<u32>>,
    requests: RefCell<Vec<MemoryRequest>>,
    dev_info_versions: RefCell<Vec<DriverVersion>>,
}

impl FakeDriver {
    pub fn new(arch_id: u32) -> Self {
        Self {
            arch_id,
            version: DriverVersion {
                major: 570,
                minor: 86,
            },
            dev_info: DevInfo {
                gpu_id: 0x100,
                primary_index: 0,
                generic_page_kind: 0xfe,
                page_kind_generation: 2,
                sector_layout: 1,
                supports_sync_fd: true,
            },
            failures: RefCell::default(),
            calls: RefCell::default(),
            next_fd: Cell::new(100),
            open_fds: RefCell::default(),
            objects: RefCell::default(),
            requests: RefCell::default(),
            dev_info_versions: RefCell::default(),
        }
    }

    pub fn with_version(mut self, major: u32, minor: u32) -> Self {
        self.version = DriverVersion { major, minor };
        self
    }

    pub fn fail(&self, op: &'static str, code: i32) {
        self.failures.borrow_mut().insert(op, code);
    }

    pub fn clear_failures(&self) {
        self.failures.borrow_mut().clear();
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn open_fds(&self) -> BTreeSet<RawFd> {
        self.open_fds.borrow().clone()
    }

    pub fn objects(&self) -> BTreeSet<u32> {
        self.objects.borrow().clone()
    }

    pub fn requests(&self) -> Vec<MemoryRequest> {
        self.requests.borrow().clone()
    }

    pub fn dev_info_versions(&self) -> Vec<DriverVersion> {
        self.dev_info_versions.borrow().clone()
    }

    fn enter(&self, op: &'static str) -> DriverResult<()> {
        self.calls.borrow_mut().push(op);
        match self.failures.borrow().get(op) {
            Some(&code) => Err(code),
            None => Ok(()),
        }
    }

    fn new_fd(&self) -> RawFd {
        let fd = self.next_fd.get();
        self.next_fd.set(fd + 1);
        self.open_fds.borrow_mut().insert(fd);
        fd
    }

    fn insert_object(&self, handle: u32) -> DriverResult<()> {
        if self.objects.borrow_mut().insert(handle) {
            Ok(())
        } else {
            Err(-libc::EEXIST)
        }
    }
}

impl RmDriver for FakeDriver {
    fn open_control(&self) -> DriverResult<RawFd> {
        self.enter("open_control")?;
        Ok(self.new_fd())
    }

    fn open_device(&self, _ctl_fd: RawFd, _instance: u32) -> DriverResult<RawFd> {
        self.enter("open_device")?;
        Ok(self.new_fd())
    }

    fn alloc_client(&self, _ctl_fd: RawFd) -> DriverResult<u32> {
        self.enter("alloc_client")?;
        self.insert_object(CLIENT_HANDLE)?;
        Ok(CLIENT_HANDLE)
    }

    fn query_driver_version(&self, _client: RmClient) -> DriverResult<DriverVersion> {
        self.enter("query_driver_version")?;
        Ok(self.version)
    }

    fn query_dev_info(&self, display_fd: RawFd, version: DriverVersion) -> DriverResult<DevInfo> {
        self.enter("query_dev_info")?;
        assert_eq!(display_fd, DISPLAY_FD);
        self.dev_info_versions.borrow_mut().push(version);
        Ok(self.dev_info)
    }

    fn query_device_instance(&self, _client: RmClient, gpu_id: u32) -> DriverResult<u32> {
        self.enter("query_device_instance")?;
        assert_eq!(gpu_id, self.dev_info.gpu_id);
        Ok(0)
    }

    fn alloc_device(&self, _client: RmClient, device: u32, _instance: u32) -> DriverResult<()> {
        self.enter("alloc_device")?;
        self.insert_object(device)
    }

    fn alloc_subdevice(&self, _client: RmClient, _device: u32, subdevice: u32) -> DriverResult<()> {
        self.enter("alloc_subdevice")?;
        self.insert_object(subdevice)
    }

    fn query_architecture(&self, _client: RmClient, _subdevice: u32) -> DriverResult<u32> {
        self.enter("query_architecture")?;
        Ok(self.arch_id)
    }

    fn query_gpu_uuid(&self, _client: RmClient, _subdevice: u32) -> DriverResult<[u8; 16]> {
        self.enter("query_gpu_uuid")?;
        Ok(TEST_UUID)
    }

    fn alloc_memory(
        &self,
        _client: RmClient,
        _device: u32,
        memory: u32,
        request: &MemoryRequest,
    ) -> DriverResult<()> {
        self.enter("alloc_memory")?;
        self.requests.borrow_mut().push(*request);
        self.insert_object(memory)
    }

    fn export_object(&self, _client: RmClient, _device: u32, object: u32) -> DriverResult<RawFd> {
        self.enter("export_object")?;
        assert!(self.objects.borrow().contains(&object));
        Ok(self.new_fd())
    }

    fn duplicate(&self, fd: RawFd) -> DriverResult<RawFd> {
        self.enter("duplicate")?;
        assert!(self.open_fds.borrow().contains(&fd));
        Ok(self.new_fd())
    }

    fn free_object(&self, _client: RmClient, _parent: u32, object: u32) -> DriverResult<()> {
        self.enter("free_object")?;
        if self.objects.borrow_mut().remove(&object) {
            Ok(())
        } else {
            Err(-libc::ENOENT)
        }
    }

    fn close(&self, fd: RawFd) -> DriverResult<()> {
        self.enter("close")?;
        if self.open_fds.borrow_mut().remove(&fd) {
            Ok(())
        } else {
            Err(-libc::EBADF)
        }
    }
}

pub fn config(sandboxed: bool) -> DriverConfig {
    DriverConfig::new().sandbox_probe(SandboxProbe::new(sandboxed, None))
}

pub fn context(arch_id: u32) -> DeviceContext<FakeDriver> {
    DeviceContext::with_driver(FakeDriver::new(arch_id), config(false))
}

pub fn initialized(arch_id: u32) -> DeviceContext<FakeDriver> {
    let mut ctx = context(arch_id);
    ctx.initialize(DISPLAY_FD).unwrap();
    ctx
}
