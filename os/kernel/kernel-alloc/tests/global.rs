mod common;

use kernel_alloc::{HhdmPhysMapper, MemoryBackends, NoShadow, register_backends};

#[test]
fn backends_register_once() {
    let frames: &'static common::HostFrames = Box::leak(Box::default());
    let page_space: &'static common::RecordingPageSpace = Box::leak(Box::default());
    let backends = MemoryBackends {
        frames,
        page_space,
        phys: &HhdmPhysMapper,
        shadow: &NoShadow,
    };

    assert!(register_backends(backends).is_ok());
    assert!(register_backends(backends).is_err());
}
