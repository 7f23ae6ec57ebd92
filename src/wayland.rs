use std::collections::HashMap;
use std::os::fd::AsFd;
use tracing::{debug, info, warn};
use wayland_client::{
    Connection, Dispatch, Proxy, QueueHandle, delegate_noop,
    protocol::{wl_output, wl_registry},
};
use wayland_protocols_wlr::gamma_control::v1::client::{
    zwlr_gamma_control_manager_v1, zwlr_gamma_control_v1,
};

use crate::adjust::AdjustmentState;
use crate::controller::{Controller, OutputEvents};
use crate::outputs::{OutputId, RampSink};
use crate::shm::{BufferError, RampBuffer};

type GammaManager = zwlr_gamma_control_manager_v1::ZwlrGammaControlManagerV1;

/// Registry name of the output a gamma control belongs to.
#[derive(Clone, Copy)]
pub struct GammaData {
    pub id: OutputId,
}

pub struct ProtocolOutput {
    pub wl_output: wl_output::WlOutput,
    pub gamma: Option<zwlr_gamma_control_v1::ZwlrGammaControlV1>,
}

/// Protocol objects per output; applies tables through `set_gamma`.
#[derive(Default)]
pub struct GammaControls {
    outputs: HashMap<OutputId, ProtocolOutput>,
}

impl GammaControls {
    fn destroy_gamma(&mut self, id: OutputId) {
        if let Some(gamma) = self.outputs.get_mut(&id).and_then(|o| o.gamma.take()) {
            gamma.destroy();
        }
    }
}

impl RampSink for GammaControls {
    fn apply_ramp(&mut self, id: OutputId, buffer: &RampBuffer) {
        let Some(gamma) = self.outputs.get(&id).and_then(|o| o.gamma.as_ref()) else {
            debug!(output = id, "no gamma control to apply to");
            return;
        };
        gamma.set_gamma(buffer.as_fd());
    }
}

pub struct AppState {
    pub controller: Controller<GammaControls>,
    pub gamma_mgr: Option<GammaManager>,
    pub gamma_mgr_name: Option<u32>,
    /// Set when a callback hit an error the loop must stop on.
    pub fatal: Option<BufferError>,
}

impl AppState {
    pub fn new(initial: AdjustmentState) -> Self {
        Self {
            controller: Controller::new(initial, GammaControls::default()),
            gamma_mgr: None,
            gamma_mgr_name: None,
            fatal: None,
        }
    }

    fn controls(&mut self) -> &mut GammaControls {
        self.controller.sink_mut()
    }

    pub fn ensure_gamma_for(&mut self, qh: &QueueHandle<Self>, id: OutputId) {
        let Some(mgr) = self.gamma_mgr.clone() else {
            return;
        };
        let Some(output) = self.controls().outputs.get_mut(&id) else {
            return;
        };
        if output.gamma.is_some() {
            return;
        }
        output.gamma = Some(mgr.get_gamma_control(&output.wl_output, qh, GammaData { id }));
    }

    pub fn ensure_gamma_all(&mut self, qh: &QueueHandle<Self>) {
        let ids: Vec<OutputId> = self.controls().outputs.keys().copied().collect();
        for id in ids {
            self.ensure_gamma_for(qh, id);
        }
    }

    fn add_output(&mut self, qh: &QueueHandle<Self>, id: OutputId, wl_output: wl_output::WlOutput) {
        self.controls().outputs.insert(
            id,
            ProtocolOutput {
                wl_output,
                gamma: None,
            },
        );
        self.controller.on_output_added(id);
        self.ensure_gamma_for(qh, id);
    }

    pub fn remove_output(&mut self, id: OutputId) {
        let controls = self.controls();
        controls.destroy_gamma(id);
        if controls.outputs.remove(&id).is_some() {
            self.controller.on_output_removed(id);
        }
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for AppState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name, interface, ..
            } => {
                if interface == wl_output::WlOutput::interface().name {
                    // only the object itself is needed, to request its gamma control
                    let wl_output = registry.bind(name, 1, qh, ());
                    state.add_output(qh, name, wl_output);
                } else if interface == GammaManager::interface().name {
                    state.gamma_mgr = Some(registry.bind(name, 1, qh, ()));
                    state.gamma_mgr_name = Some(name);
                    state.ensure_gamma_all(qh);
                }
            }
            wl_registry::Event::GlobalRemove { name } => {
                if state.gamma_mgr_name == Some(name) {
                    warn!("gamma control manager went away");
                    state.gamma_mgr = None;
                    state.gamma_mgr_name = None;
                }
                state.remove_output(name);
            }
            _ => {}
        }
    }
}

impl Dispatch<zwlr_gamma_control_v1::ZwlrGammaControlV1, GammaData> for AppState {
    fn event(
        state: &mut Self,
        _: &zwlr_gamma_control_v1::ZwlrGammaControlV1,
        event: zwlr_gamma_control_v1::Event,
        data: &GammaData,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_gamma_control_v1::Event::GammaSize { size } => {
                info!(output = data.id, size, "gamma size");
                if let Err(err) = state.controller.on_gamma_size(data.id, size) {
                    if state.fatal.is_none() {
                        state.fatal = Some(err);
                    }
                }
            }
            zwlr_gamma_control_v1::Event::Failed => {
                warn!(output = data.id, "compositor refused gamma control");
                state.controls().destroy_gamma(data.id);
                state.controller.on_failed(data.id);
            }
            _ => {}
        }
    }
}

delegate_noop!(AppState: ignore GammaManager);
delegate_noop!(AppState: ignore wl_output::WlOutput);
