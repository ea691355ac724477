use std::sync::{Arc, Mutex};

use glam::Vec2;
use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

#[cfg(target_arch = "wasm32")]
use js_sys::Promise;
#[cfg(target_arch = "wasm32")]
use once_cell::sync::OnceCell;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen_futures::future_to_promise;

mod app_state;
mod camera;
pub mod color;
pub mod iso;
mod models;
pub mod scene;
mod ui_events;

use app_state::State;
use scene::network::DeviceNetwork;
use ui_events::{FilterToggle, UserCommand};

/// Built-in demo document used when the host supplies nothing.
const SAMPLE_NETWORK_JSON: &str = include_str!("../assets/sample_network.json");

/// Clicks that travel farther than this are camera pans, not selections.
const CLICK_SLOP_PX: f32 = 4.0;

#[cfg(target_arch = "wasm32")]
static WASM_API_INSTANCE: OnceCell<WasmApi> = OnceCell::new();

#[cfg(target_arch = "wasm32")]
static WASM_READY_FLUME_CHANNEL: OnceCell<(flume::Sender<()>, flume::Receiver<()>)> =
    OnceCell::new();

struct App {
    window: Option<Arc<Window>>,
    state: Arc<Mutex<Option<State>>>, // interior mutability; State is created async on wasm
    initial_network: Option<DeviceNetwork>,
    #[cfg(target_arch = "wasm32")]
    proxy: Option<EventLoopProxy<UserCommand>>,
}

impl App {
    fn new(
        initial_network: Option<DeviceNetwork>,
        #[cfg(target_arch = "wasm32")] event_loop: &EventLoop<UserCommand>,
    ) -> Self {
        #[cfg(target_arch = "wasm32")]
        let app_proxy = event_loop.create_proxy();

        #[cfg(target_arch = "wasm32")]
        {
            let wasm_api_instance = WasmApi {
                proxy: app_proxy.clone(),
            };
            if WASM_API_INSTANCE.set(wasm_api_instance).is_err() {
                log::warn!("WASM_API_INSTANCE was already set. This should only happen once.");
            }
        }

        Self {
            window: None,
            state: Arc::new(Mutex::new(None)),
            initial_network,
            #[cfg(target_arch = "wasm32")]
            proxy: Some(app_proxy),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn get_window_size(&self) -> Option<winit::dpi::PhysicalSize<u32>> {
        self.window.as_ref().map(|w| w.inner_size())
    }
}

impl ApplicationHandler<UserCommand> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let mut window_attributes =
            Window::default_attributes().with_title("DePINView Device Network");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = Arc::new(event_loop.create_window(window_attributes).unwrap());
        self.window = Some(window.clone());

        #[cfg(not(target_arch = "wasm32"))]
        {
            let mut state = pollster::block_on(State::new(window)).unwrap();
            let current_size = self.get_window_size().unwrap();
            state.resize(current_size.width, current_size.height);
            if let Some(network) = self.initial_network.take() {
                state.process_command(UserCommand::SetDeviceNetwork(network));
            }
            self.state.lock().unwrap().replace(state);
            self.window.as_ref().unwrap().request_redraw();
        }

        #[cfg(target_arch = "wasm32")]
        {
            let state_arc_for_spawn = self.state.clone();
            let window_for_state_new = window.clone();
            let initial_network = self.initial_network.take();
            let proxy_for_init_notification =
                self.proxy.as_ref().expect("App proxy not set").clone();

            wasm_bindgen_futures::spawn_local(async move {
                match State::new(window_for_state_new.clone()).await {
                    Ok(mut state_instance) => {
                        log::info!("WASM State created in async task.");
                        let initial_size = window_for_state_new.inner_size();
                        state_instance.resize(initial_size.width, initial_size.height);
                        if let Some(network) = initial_network {
                            state_instance
                                .process_command(UserCommand::SetDeviceNetwork(network));
                        }

                        {
                            let mut app_state_guard = state_arc_for_spawn.lock().unwrap();
                            app_state_guard.replace(state_instance);
                        }
                        log::info!("WASM State assigned to App. Sending initialization notification.");
                        if proxy_for_init_notification
                            .send_event(UserCommand::StateInitialized)
                            .is_err()
                        {
                            log::error!("Failed to send StateInitialized event.");
                        }
                    }
                    Err(e) => log::error!("Failed to create State in WASM: {:?}", e),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserCommand) {
        match event {
            UserCommand::StateInitialized => {
                log::info!("WASM State initialized and ready.");
                #[cfg(target_arch = "wasm32")]
                if let Some((sender, _)) = WASM_READY_FLUME_CHANNEL.get() {
                    if let Err(e) = sender.send(()) {
                        log::error!("Failed to send WASM ready signal: {:?}", e);
                    }
                }
                if let Some(w_handle) = self.window.as_ref() {
                    w_handle.request_redraw();
                }
            }
            _ => {
                if let Some(state) = &mut *self.state.lock().unwrap() {
                    state.process_command(event);
                    if let Some(w_handle) = self.window.as_ref() {
                        w_handle.request_redraw();
                    }
                } else {
                    log::warn!(
                        "Received a command before state was initialized (via proxy). Ignoring: {:?}",
                        event
                    );
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut *self.state.lock().unwrap() else {
            log::warn!("Window event received before State was initialized, ignoring.");
            return;
        };

        let window_handle = self.window.as_ref().unwrap();

        let mut needs_redraw = false;

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.resize(size.width, size.height);
                needs_redraw = true;
            }
            WindowEvent::RedrawRequested => {
                state.update(Instant::now());
                match state.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => {
                        state.resize(state.config.width, state.config.height)
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                    Err(e) => log::error!("{:?}", e),
                }
                // Particles and agent moves run off the clock; keep frames
                // coming while a scene is loaded.
                if state.wants_animation_frames() {
                    needs_redraw = true;
                }
            }
            WindowEvent::MouseInput {
                state: mouse_button_state,
                button,
                ..
            } => match (button, mouse_button_state.is_pressed()) {
                (MouseButton::Left, true) => {
                    state.is_mouse_left_pressed = true;
                    state.mouse_press_pos_screen = Some(state.mouse_current_pos_screen);
                    state.camera.start_panning(state.mouse_current_pos_screen);
                }
                (MouseButton::Left, false) => {
                    state.is_mouse_left_pressed = false;
                    state.camera.end_panning();
                    // A release close to the press point is a click, not a pan.
                    if let Some(pressed_at) = state.mouse_press_pos_screen.take() {
                        if pressed_at.distance(state.mouse_current_pos_screen) <= CLICK_SLOP_PX {
                            if let Some(selection) =
                                state.handle_click(state.mouse_current_pos_screen)
                            {
                                log::info!("Selection changed: {:?}", selection);
                            }
                            needs_redraw = true;
                        }
                    }
                }
                _ => {}
            },
            WindowEvent::CursorMoved { position, .. } => {
                state.mouse_current_pos_screen = Vec2::new(position.x as f32, position.y as f32);
                if state.is_mouse_left_pressed {
                    state.camera.pan(state.mouse_current_pos_screen);
                    state.camera_needs_update = true;
                    needs_redraw = true;
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let y_scroll_delta = match delta {
                    MouseScrollDelta::LineDelta(_x, y) => y * 10.0,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                };

                let zoom_factor = if y_scroll_delta > 0.0 { 1.1 } else { 1.0 / 1.1 };
                let mouse_world_pos = state.camera.screen_to_world(state.mouse_current_pos_screen);
                state.camera.zoom_by(zoom_factor, mouse_world_pos);
                state.camera_needs_update = true;
                needs_redraw = true;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: key_state,
                        repeat,
                        ..
                    },
                ..
            } => {
                if key_state.is_pressed() && !repeat {
                    let mut changed = false;
                    let pan_speed = 10.0 / state.camera.zoom;
                    let zoom_factor = 1.1;

                    match code {
                        KeyCode::KeyW | KeyCode::ArrowUp => {
                            state.camera.position.y += pan_speed;
                            changed = true;
                        }
                        KeyCode::KeyS | KeyCode::ArrowDown => {
                            state.camera.position.y -= pan_speed;
                            changed = true;
                        }
                        KeyCode::KeyA | KeyCode::ArrowLeft => {
                            state.camera.position.x -= pan_speed;
                            changed = true;
                        }
                        KeyCode::KeyD | KeyCode::ArrowRight => {
                            state.camera.position.x += pan_speed;
                            changed = true;
                        }
                        KeyCode::KeyQ => {
                            state.camera.zoom *= zoom_factor;
                            changed = true;
                        }
                        KeyCode::KeyE => {
                            state.camera.zoom /= zoom_factor;
                            changed = true;
                        }
                        KeyCode::Digit1 => {
                            state.process_command(UserCommand::ToggleFilter(
                                FilterToggle::MyDevices,
                            ));
                            needs_redraw = true;
                        }
                        KeyCode::Digit2 => {
                            state
                                .process_command(UserCommand::ToggleFilter(FilterToggle::MyAgents));
                            needs_redraw = true;
                        }
                        KeyCode::Digit3 => {
                            state.process_command(UserCommand::ToggleFilter(
                                FilterToggle::TokenHoldings,
                            ));
                            needs_redraw = true;
                        }
                        KeyCode::Digit4 => {
                            state.process_command(UserCommand::ToggleFilter(FilterToggle::ShowAll));
                            needs_redraw = true;
                        }
                        KeyCode::Escape => {
                            state.process_command(UserCommand::ClearSelection);
                            needs_redraw = true;
                        }
                        KeyCode::KeyR => log::info!("FPS: {}", state.current_fps),
                        _ => {}
                    }

                    if changed {
                        state.camera_needs_update = true;
                        needs_redraw = true;
                    }
                }
            }
            _ => {}
        }

        if needs_redraw {
            window_handle.request_redraw();
        }
    }
}

/// Loads the scene document for the native build: a JSON path named by
/// `DEPINVIEW_NETWORK`, falling back to the bundled sample.
#[cfg(not(target_arch = "wasm32"))]
fn load_initial_network() -> anyhow::Result<DeviceNetwork> {
    let raw = match std::env::var("DEPINVIEW_NETWORK") {
        Ok(path) => {
            log::info!("Loading device network from {path}");
            std::fs::read_to_string(path)?
        }
        Err(_) => SAMPLE_NETWORK_JSON.to_string(),
    };
    Ok(serde_json::from_str(&raw)?)
}

pub fn run() -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        env_logger::init();
    }
    #[cfg(target_arch = "wasm32")]
    {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).unwrap_throw();
        log::info!("Starting DePINView application.");
        let (sender, receiver) = flume::unbounded();
        WASM_READY_FLUME_CHANNEL
            .set((sender, receiver))
            .expect("Failed to initialize WASM_READY_CHANNEL. This should not happen.");
        log::info!("WASM ready channel created and stored.");
    }

    #[cfg(not(target_arch = "wasm32"))]
    let initial_network = Some(load_initial_network()?);
    // On wasm the host injects the document through the API once ready; the
    // bundled sample is still parsed so an API-less embed shows something.
    #[cfg(target_arch = "wasm32")]
    let initial_network = serde_json::from_str(SAMPLE_NETWORK_JSON).ok();

    let event_loop = EventLoop::with_user_event().build()?;
    let mut app = App::new(
        initial_network,
        #[cfg(target_arch = "wasm32")]
        &event_loop,
    );
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    log::info!("WASM started: Calling run().");
    run().unwrap_throw();

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
#[derive(Clone, Debug)]
pub struct WasmApi {
    proxy: EventLoopProxy<UserCommand>,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl WasmApi {
    #[wasm_bindgen(js_name = setDeviceNetwork)]
    pub fn set_device_network(&self, network_json: &str) -> Result<(), JsValue> {
        let parsed: DeviceNetwork = serde_json::from_str(network_json)
            .map_err(|e| JsValue::from_str(&format!("JSON parsing error: {}", e)))?;

        log::info!("Received SetDeviceNetwork command from JS.");

        if self
            .proxy
            .send_event(UserCommand::SetDeviceNetwork(parsed))
            .is_err()
        {
            return Err(JsValue::from_str("Failed to send command to event loop."));
        }
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmApi)]
pub fn get_wasm_api() -> Result<WasmApi, JsValue> {
    WASM_API_INSTANCE
        .get()
        .cloned()
        .ok_or_else(|| JsValue::from_str("WasmApi is not initialized. Call run_web() first."))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmReadyPromise)]
pub fn get_wasm_ready_promise() -> Result<Promise, JsValue> {
    let (_, receiver) = WASM_READY_FLUME_CHANNEL.get().ok_or_else(|| {
        JsValue::from_str(
            "WASM ready channel already taken or not initialized. Make sure getWasmApi() is called only once.",
        )
    })?;

    let ready_promise = future_to_promise(async move {
        receiver.recv_async().await.unwrap_throw();
        Ok(JsValue::NULL)
    });

    Ok(ready_promise)
}
