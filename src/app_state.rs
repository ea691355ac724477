use std::sync::Arc;

use glam::{DVec2, Vec2};
use instant::Instant;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::camera::{Camera, CameraUniform};
use crate::color::Color;
use crate::iso;
use crate::models::{CircleInstance, LineVertex, PolyVertex, Vertex2D};
use crate::scene::agent::{self, Movements};
use crate::scene::device;
use crate::scene::flow::{self, FlowField};
use crate::scene::network::{DeviceNetwork, COMMAND_CENTER};
use crate::scene::scene::{
    agent_marker_pos, command_center_pos, device_marker_pos, ordered_cells, SceneState,
};
use crate::scene::tile;

const LINES_WGSL: &str = include_str!("./shaders/lines.wgsl");
const CIRCLES_WGSL: &str = include_str!("./shaders/circles.wgsl");
const POLYS_WGSL: &str = include_str!("./shaders/polys.wgsl");

const GROUND_TILE_COLOR: &str = "#1e293b";
const COMMAND_CENTER_COLOR: &str = "#0ea5e9";
const PARTICLE_COLOR: &str = "#fde047";
const BACKGROUND_COLOR: (u8, u8, u8) = (15, 17, 26);

/// Selection change reported to the embedding container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    Device(String),
    Agent(String),
    Cleared,
}

pub struct State {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub is_surface_configured: bool,

    // Glyphon related fields
    pub glyphon_font_system: glyphon::FontSystem,
    pub glyphon_viewport: glyphon::Viewport,
    pub glyphon_swash_cache: glyphon::SwashCache,
    pub glyphon_atlas: glyphon::TextAtlas,
    pub glyphon_renderer: glyphon::TextRenderer,
    label_buffer: glyphon::Buffer,
    hud_buffer: glyphon::Buffer,
    icon_buffers: Vec<glyphon::Buffer>,

    pub camera: Camera,
    pub camera_buffer: wgpu::Buffer,
    pub camera_bind_group: wgpu::BindGroup,
    pub camera_uniform: CameraUniform,
    pub camera_needs_update: bool,

    pub poly_render_pipeline: wgpu::RenderPipeline,
    pub line_render_pipeline: wgpu::RenderPipeline,
    pub circle_render_pipeline: wgpu::RenderPipeline,

    poly_vertices: Vec<PolyVertex>,
    poly_vertex_buffer: wgpu::Buffer,
    line_vertices: Vec<LineVertex>,
    line_vertex_buffer: wgpu::Buffer,
    circle_instances: Vec<CircleInstance>,
    circle_instance_buffer: wgpu::Buffer,
    quad_vertex_buffer: wgpu::Buffer,
    quad_index_buffer: wgpu::Buffer,

    pub mouse_current_pos_screen: Vec2,
    pub is_mouse_left_pressed: bool,
    pub mouse_press_pos_screen: Option<Vec2>,

    pub last_frame_instant: Instant,
    pub frame_count_in_second: u32,
    pub current_fps: u32,

    // Scene state
    pub network: Option<DeviceNetwork>,
    pub scene: SceneState,
    pub flow: FlowField,
    pub movements: Movements,
}

impl State {
    pub async fn new(window_arc: Arc<Window>) -> anyhow::Result<State> {
        let size = window_arc.inner_size();

        let gpu = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::BROWSER_WEBGPU,
            ..Default::default()
        });

        // Surface itself is !Send on WASM due to HtmlCanvasElement
        let surface = gpu.create_surface(window_arc).unwrap();

        let adapter = gpu
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .unwrap();
        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .unwrap();

        let surface_caps = surface.get_capabilities(&adapter);
        let texture_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or_else(|| {
                log::warn!(
                    "No sRGB surface format found, falling back to {:?}",
                    surface_caps.formats[0]
                );
                surface_caps.formats[0]
            });

        let needs_shader_srgb_output_conversion = !texture_format.is_srgb();

        log::info!(
            "Using {} ({:?}, Target Format: {:?}), Needs Shader sRGB Output Conversion: {}",
            adapter_info.name,
            adapter_info.backend,
            texture_format,
            needs_shader_srgb_output_conversion
        );

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: texture_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        // --- Glyphon Initialization ---
        let mut glyphon_font_system = glyphon::FontSystem::new();
        let glyphon_swash_cache = glyphon::SwashCache::new();
        let glyphon_cache = glyphon::Cache::new(&device);
        let glyphon_viewport = glyphon::Viewport::new(&device, &glyphon_cache);
        let mut glyphon_atlas =
            glyphon::TextAtlas::new(&device, &queue, &glyphon_cache, texture_format);
        let glyphon_renderer = glyphon::TextRenderer::new(
            &mut glyphon_atlas,
            &device,
            wgpu::MultisampleState::default(),
            None,
        );

        let mut label_buffer =
            glyphon::Buffer::new(&mut glyphon_font_system, glyphon::Metrics::new(15.0, 20.0));
        label_buffer.set_size(&mut glyphon_font_system, Some(size.width as f32), None);
        let mut hud_buffer =
            glyphon::Buffer::new(&mut glyphon_font_system, glyphon::Metrics::new(13.0, 17.0));
        hud_buffer.set_size(&mut glyphon_font_system, Some(size.width as f32), None);

        #[allow(unused_mut)]
        let mut camera = Camera::new(size.width, size.height);
        let camera_uniform = CameraUniform {
            view_proj: camera.build_view_projection_matrix().to_cols_array_2d(),
            needs_srgb_output_conversion: needs_shader_srgb_output_conversion as u32,
            _padding: [0; 3],
        };

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("Camera Bind Group Layout"),
            });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
            label: Some("Camera Bind Group"),
        });

        // --- Shader modules ---
        let lines_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lines Shader"),
            source: wgpu::ShaderSource::Wgsl(LINES_WGSL.into()),
        });

        let circles_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Circles Shader"),
            source: wgpu::ShaderSource::Wgsl(CIRCLES_WGSL.into()),
        });

        let polys_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Polys Shader"),
            source: wgpu::ShaderSource::Wgsl(POLYS_WGSL.into()),
        });

        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[&camera_bind_group_layout],
                push_constant_ranges: &[],
            });

        // --- Tile-face pipeline (filled triangles) ---
        let poly_render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Poly Render Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &polys_shader_module,
                entry_point: Some("vs_main"),
                buffers: &[PolyVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &polys_shader_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Buffer order is paint order; both windings occur.
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        // --- Line pipeline ---
        let line_render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Line Render Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &lines_shader_module,
                entry_point: Some("vs_main"),
                buffers: &[LineVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &lines_shader_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        // --- Circle pipeline ---
        let circle_render_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Circle Render Pipeline"),
                layout: Some(&render_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &circles_shader_module,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex2D::layout(), CircleInstance::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &circles_shader_module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });

        let poly_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Poly Vertex Buffer"),
            contents: &[],
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let line_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Line Vertex Buffer"),
            contents: &[],
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let circle_instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Circle Instance Buffer"),
            contents: &[],
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(Vertex2D::QUAD_VERTICES.as_slice()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let quad_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Index Buffer"),
            contents: bytemuck::cast_slice(Vertex2D::QUAD_INDICES.as_slice()),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            is_surface_configured: false,
            glyphon_font_system,
            glyphon_swash_cache,
            glyphon_viewport,
            glyphon_atlas,
            glyphon_renderer,
            label_buffer,
            hud_buffer,
            icon_buffers: Vec::new(),
            camera,
            camera_buffer,
            camera_bind_group,
            camera_uniform,
            camera_needs_update: true,
            poly_render_pipeline,
            line_render_pipeline,
            circle_render_pipeline,
            poly_vertices: Vec::new(),
            poly_vertex_buffer,
            line_vertices: Vec::new(),
            line_vertex_buffer,
            circle_instances: Vec::new(),
            circle_instance_buffer,
            quad_vertex_buffer,
            quad_index_buffer,
            mouse_current_pos_screen: Vec2::ZERO,
            is_mouse_left_pressed: false,
            mouse_press_pos_screen: None,
            last_frame_instant: Instant::now(),
            frame_count_in_second: 0,
            current_fps: 0,
            network: None,
            scene: SceneState::default(),
            flow: FlowField::default(),
            movements: Movements::default(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            log::info!("Resize {}, {}", width, height);
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);

            self.label_buffer
                .set_size(&mut self.glyphon_font_system, Some(width as f32), None);
            self.hud_buffer
                .set_size(&mut self.glyphon_font_system, Some(width as f32), None);

            self.camera.update_aspect_ratio(width, height);
            self.camera_needs_update = true;
            self.is_surface_configured = true;
        }
    }

    /// Scenes with a loaded network animate continuously; the app shell keeps
    /// requesting redraws while this is true.
    pub fn wants_animation_frames(&self) -> bool {
        self.network.is_some()
    }

    /// Per-frame tick: camera upload, animation advance, geometry rebuild.
    pub fn update(&mut self, now: Instant) -> bool {
        let mut changed = false;

        if self.camera_needs_update {
            self.camera_uniform.view_proj =
                self.camera.build_view_projection_matrix().to_cols_array_2d();
            self.queue.write_buffer(
                &self.camera_buffer,
                0,
                bytemuck::cast_slice(&[self.camera_uniform]),
            );
            self.camera_needs_update = false;
            changed = true;
        }

        if let Some(net) = self.network.take() {
            self.movements.update(&net, now);

            let eligible: Vec<&crate::scene::network::Device> = net
                .devices
                .iter()
                .filter(|d| self.scene.device_visible(&net, d))
                .filter(|d| net.managing_agent(d).is_some())
                .collect();
            self.flow.tick(&eligible, now, &mut rand::thread_rng());

            self.rebuild_scene(&net, now);
            self.network = Some(net);
            self.update_gpu_buffers();
            changed = true;
        }

        changed
    }

    /// Click handling: agents sit on top of devices, so they hit-test first.
    /// A click on empty ground leaves the selection untouched.
    pub fn handle_click(&mut self, screen_pos: Vec2) -> Option<SelectionEvent> {
        enum Hit {
            Agent(String),
            Device(String),
        }

        let world = self.camera.screen_to_world(screen_pos);
        let now = Instant::now();

        let hit = {
            let net = self.network.as_ref()?;

            let mut hit_agent: Option<(i64, String)> = None;
            for a in net.agents.iter().filter(|a| self.scene.agent_visible(net, a)) {
                let Some(pos) = self.movements.drawn_position(net, a, now) else {
                    continue;
                };
                let marker = agent_marker_pos(pos);
                if world.distance(marker) <= agent::MARKER_RADIUS * 1.4 {
                    let key = iso::z_index(pos.x, pos.y, agent::AGENT_ELEVATION);
                    if hit_agent.as_ref().is_none_or(|(best, _)| key > *best) {
                        hit_agent = Some((key, a.id.clone()));
                    }
                }
            }

            if let Some((_, id)) = hit_agent {
                Some(Hit::Agent(id))
            } else {
                // Devices are tile-sized targets: hit by containing cell or
                // by the marker itself.
                let grid = iso::screen_to_grid(DVec2::new(world.x as f64, -world.y as f64));
                let mut hit_device: Option<(i64, String)> = None;
                for d in net
                    .devices
                    .iter()
                    .filter(|d| self.scene.device_visible(net, d))
                {
                    let cell_hit =
                        grid.x.floor() == d.position.x && grid.y.floor() == d.position.y;
                    let marker_hit =
                        world.distance(device_marker_pos(d)) <= device::MARKER_RADIUS * 1.4;
                    if cell_hit || marker_hit {
                        let key =
                            iso::z_index(d.position.x, d.position.y, device::DEVICE_ELEVATION);
                        if hit_device.as_ref().is_none_or(|(best, _)| key > *best) {
                            hit_device = Some((key, d.id.clone()));
                        }
                    }
                }
                hit_device.map(|(_, id)| Hit::Device(id))
            }
        };

        match hit? {
            Hit::Agent(id) => {
                self.scene.select_agent(&id);
                Some(match self.scene.selected_agent() {
                    Some(_) => SelectionEvent::Agent(id),
                    None => SelectionEvent::Cleared,
                })
            }
            Hit::Device(id) => {
                self.scene.select_device(&id);
                Some(match self.scene.selected_device() {
                    Some(_) => SelectionEvent::Device(id),
                    None => SelectionEvent::Cleared,
                })
            }
        }
    }

    /// Rebuilds every vertex/instance vec from the document, back to front
    /// per the iso z-index within each layer.
    fn rebuild_scene(&mut self, net: &DeviceNetwork, now: Instant) {
        let mut polys: Vec<PolyVertex> = Vec::new();
        let mut lines: Vec<LineVertex> = Vec::new();
        let mut circles: Vec<CircleInstance> = Vec::new();

        // Ground layer: every grid cell, with the command center called out.
        let ground = Color::from_hex(GROUND_TILE_COLOR).unwrap_or(Color::from((30, 41, 59)));
        let center_color =
            Color::from_hex(COMMAND_CENTER_COLOR).unwrap_or(Color::from((14, 165, 233)));
        for (x, y) in ordered_cells(net.grid_size) {
            let is_center = x as f64 == COMMAND_CENTER.x && y as f64 == COMMAND_CENTER.y;
            let top = if is_center {
                center_color
            } else if (x + y) % 2 == 0 {
                ground
            } else {
                ground.adjust_brightness(8.0)
            };
            tile::build_tile(&mut polys, x as f64, y as f64, 0.0, top, 1.0, false);
        }

        // Device layer.
        let mut devices: Vec<&crate::scene::network::Device> = net
            .devices
            .iter()
            .filter(|d| self.scene.device_visible(net, d))
            .collect();
        devices.sort_by_key(|d| iso::z_index(d.position.x, d.position.y, device::DEVICE_ELEVATION));
        for d in &devices {
            let selected = self.scene.selected_device() == Some(d.id.as_str());
            let alpha = device::device_alpha(net, d);
            tile::build_tile(
                &mut polys,
                d.position.x,
                d.position.y,
                device::DEVICE_ELEVATION,
                device::kind_color(d.kind),
                alpha,
                selected,
            );
            if selected {
                tile::build_tile_outline(
                    &mut lines,
                    d.position.x,
                    d.position.y,
                    device::DEVICE_ELEVATION,
                );
            }

            let marker = device_marker_pos(d);
            circles.push(CircleInstance {
                position: marker.into(),
                radius_scale: device::MARKER_RADIUS,
                color: device::kind_color(d.kind).adjust_brightness(25.0).with_alpha(alpha),
            });
            circles.push(CircleInstance {
                position: (marker + Vec2::splat(device::MARKER_RADIUS * 0.8)).into(),
                radius_scale: device::BADGE_RADIUS,
                color: device::badge_color(d.verification).with_alpha(1.0),
            });
        }

        // Agent layer floats above the devices.
        let mut agents: Vec<&crate::scene::network::NetworkAgent> = net
            .agents
            .iter()
            .filter(|a| self.scene.agent_visible(net, a))
            .collect();
        agents.sort_by_key(|a| {
            let pos = a.position.unwrap_or(COMMAND_CENTER);
            iso::z_index(pos.x, pos.y, agent::AGENT_ELEVATION)
        });
        for a in &agents {
            let Some(pos) = self.movements.drawn_position(net, a, now) else {
                continue;
            };
            let alpha = agent::agent_alpha(net, a);
            let marker = agent_marker_pos(pos);
            circles.push(CircleInstance {
                position: marker.into(),
                radius_scale: agent::MARKER_RADIUS,
                color: agent::kind_color(a.kind).with_alpha(alpha),
            });
            circles.push(CircleInstance {
                position: (marker + Vec2::splat(agent::MARKER_RADIUS * 0.8)).into(),
                radius_scale: device::BADGE_RADIUS,
                color: device::badge_color(a.verification).with_alpha(1.0),
            });
            if self.scene.selected_agent() == Some(a.id.as_str()) {
                // Selection ring around the marker.
                circles.push(CircleInstance {
                    position: marker.into(),
                    radius_scale: agent::MARKER_RADIUS * 1.5,
                    color: Color::from_hex(tile::SELECTION_GLOW)
                        .unwrap_or(Color::from((251, 191, 36)))
                        .with_alpha(0.35),
                });
            }
        }

        // Flow layer: static dashed lines plus riding particles. A device
        // whose managing agent no longer resolves is skipped silently.
        let line_color = flow::flow_line_color();
        let particle_color = Color::from_hex(PARTICLE_COLOR)
            .unwrap_or(Color::from((253, 224, 71)))
            .with_alpha(0.9);
        let user_pos = command_center_pos();
        for d in &devices {
            let Some(managing) = net.managing_agent(d) else {
                continue;
            };
            let Some(agent_pos) = self.movements.drawn_position(net, managing, now) else {
                continue;
            };
            let from = device_marker_pos(d);
            let to = agent_marker_pos(agent_pos);
            flow::build_dashed_line(&mut lines, from, to, line_color);
            if managing.is_owned_by(&net.user_address) {
                flow::build_dashed_line(&mut lines, to, user_pos, line_color);
            }
        }
        for (device_id, progress) in self.flow.particles(now) {
            let Some(d) = net.device(device_id) else {
                continue;
            };
            if !self.scene.device_visible(net, d) {
                continue;
            }
            let Some(managing) = net.managing_agent(d) else {
                continue;
            };
            let Some(agent_pos) = self.movements.drawn_position(net, managing, now) else {
                continue;
            };
            let p = flow::particle_point(
                progress,
                device_marker_pos(d),
                agent_marker_pos(agent_pos),
                managing.is_owned_by(&net.user_address),
                user_pos,
            );
            circles.push(CircleInstance {
                position: p.into(),
                radius_scale: flow::PARTICLE_RADIUS,
                color: particle_color,
            });
        }

        self.poly_vertices = polys;
        self.line_vertices = lines;
        self.circle_instances = circles;
    }

    fn update_gpu_buffers(&mut self) {
        let poly_data = bytemuck::cast_slice(&self.poly_vertices);
        let line_data = bytemuck::cast_slice(&self.line_vertices);
        let circle_data = bytemuck::cast_slice(&self.circle_instances);

        if self.poly_vertex_buffer.size() < poly_data.len() as u64 {
            self.poly_vertex_buffer =
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Poly Vertex Buffer (Resized)"),
                        contents: poly_data,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    });
        } else {
            self.queue.write_buffer(&self.poly_vertex_buffer, 0, poly_data);
        }

        if self.line_vertex_buffer.size() < line_data.len() as u64 {
            self.line_vertex_buffer =
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Line Vertex Buffer (Resized)"),
                        contents: line_data,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    });
        } else {
            self.queue.write_buffer(&self.line_vertex_buffer, 0, line_data);
        }

        if self.circle_instance_buffer.size() < circle_data.len() as u64 {
            self.circle_instance_buffer =
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Circle Instance Buffer (Resized)"),
                        contents: circle_data,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    });
        } else {
            self.queue
                .write_buffer(&self.circle_instance_buffer, 0, circle_data);
        }
    }

    /// Selection label text and its screen anchor, if something is selected.
    fn selection_label(&self) -> Option<(String, Vec2)> {
        let net = self.network.as_ref()?;
        if let Some(id) = self.scene.selected_device() {
            let d = net.device(id)?;
            let screen = self.camera.world_to_screen(device_marker_pos(d));
            return Some((device::device_label(d), screen));
        }
        if let Some(id) = self.scene.selected_agent() {
            let a = net.agent(id)?;
            let pos = self
                .movements
                .drawn_position(net, a, Instant::now())?;
            let screen = self.camera.world_to_screen(agent_marker_pos(pos));
            return Some((agent::agent_label(a), screen));
        }
        None
    }

    /// Icon glyph and screen anchor for every visible entity marker.
    fn visible_entity_icons(&self) -> Vec<(&'static str, Vec2)> {
        let Some(net) = self.network.as_ref() else {
            return Vec::new();
        };
        let now = Instant::now();
        let mut icons = Vec::new();
        for d in net
            .devices
            .iter()
            .filter(|d| self.scene.device_visible(net, d))
        {
            let screen = self.camera.world_to_screen(device_marker_pos(d));
            icons.push((device::kind_icon(d.kind), screen));
        }
        for a in net
            .agents
            .iter()
            .filter(|a| self.scene.agent_visible(net, a))
        {
            if let Some(pos) = self.movements.drawn_position(net, a, now) {
                let screen = self.camera.world_to_screen(agent_marker_pos(pos));
                icons.push((agent::kind_icon(a.kind), screen));
            }
        }
        icons
    }

    fn hud_line(&self) -> String {
        let f = &self.scene.filters;
        let mark = |on: bool| if on { "on" } else { "off" };
        format!(
            "[1] devices {} · [2] agents {} · [3] tokens {} · [4] all {} · {} fps",
            mark(f.show_my_devices),
            mark(f.show_my_agents),
            mark(f.show_token_holdings),
            mark(f.show_all),
            self.current_fps
        )
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        if !self.is_surface_configured {
            return Ok(());
        }

        let width = self.config.width;
        let height = self.config.height;
        self.glyphon_viewport
            .update(&self.queue, glyphon::Resolution { width, height });

        // --- FPS Calculation ---
        self.frame_count_in_second += 1;
        let now = Instant::now();
        let elapsed = (now - self.last_frame_instant).as_secs_f32();

        if elapsed >= 1.0 {
            self.current_fps = self.frame_count_in_second;
            self.frame_count_in_second = 0;
            self.last_frame_instant = now;
        }

        // --- Prepare text: HUD line, selection label, entity icons ---
        let attrs = glyphon::Attrs::new().family(glyphon::Family::SansSerif);
        let selection = self.selection_label();
        let icons = self.visible_entity_icons();

        let hud_text = self.hud_line();
        self.hud_buffer.set_text(
            &mut self.glyphon_font_system,
            &hud_text,
            &attrs,
            glyphon::Shaping::Advanced,
        );
        self.hud_buffer
            .shape_until_scroll(&mut self.glyphon_font_system, false);

        if let Some((text, _)) = &selection {
            self.label_buffer.set_text(
                &mut self.glyphon_font_system,
                text,
                &attrs,
                glyphon::Shaping::Advanced,
            );
            self.label_buffer
                .shape_until_scroll(&mut self.glyphon_font_system, false);
        }

        while self.icon_buffers.len() < icons.len() {
            let mut buffer = glyphon::Buffer::new(
                &mut self.glyphon_font_system,
                glyphon::Metrics::new(13.0, 15.0),
            );
            buffer.set_size(&mut self.glyphon_font_system, Some(40.0), None);
            self.icon_buffers.push(buffer);
        }
        for ((glyph, _), buffer) in icons.iter().zip(self.icon_buffers.iter_mut()) {
            buffer.set_text(
                &mut self.glyphon_font_system,
                glyph,
                &attrs,
                glyphon::Shaping::Advanced,
            );
            buffer.shape_until_scroll(&mut self.glyphon_font_system, false);
        }

        let mut text_areas = vec![glyphon::TextArea {
            buffer: &self.hud_buffer,
            left: 12.0,
            top: 10.0,
            scale: 1.0,
            bounds: glyphon::TextBounds::default(),
            default_color: glyphon::Color::rgb(226, 232, 240),
            custom_glyphs: &[],
        }];
        for ((_, anchor), buffer) in icons.iter().zip(self.icon_buffers.iter()) {
            text_areas.push(glyphon::TextArea {
                buffer,
                left: anchor.x - 6.0,
                top: anchor.y - 8.0,
                scale: 1.0,
                bounds: glyphon::TextBounds::default(),
                default_color: glyphon::Color::rgb(15, 17, 26),
                custom_glyphs: &[],
            });
        }
        if let Some((_, anchor)) = &selection {
            text_areas.push(glyphon::TextArea {
                buffer: &self.label_buffer,
                left: anchor.x + 14.0,
                top: anchor.y - 28.0,
                scale: 1.0,
                bounds: glyphon::TextBounds::default(),
                default_color: glyphon::Color::rgb(250, 250, 250),
                custom_glyphs: &[],
            });
        }

        self.glyphon_renderer
            .prepare(
                &self.device,
                &self.queue,
                &mut self.glyphon_font_system,
                &mut self.glyphon_atlas,
                &self.glyphon_viewport,
                text_areas,
                &mut self.glyphon_swash_cache,
            )
            .unwrap();

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(
                            Color::from(BACKGROUND_COLOR).into_linear_wgpu_color(),
                        ),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);

            // Tiles first, then lines, then markers/particles on top.
            if !self.poly_vertices.is_empty() {
                render_pass.set_pipeline(&self.poly_render_pipeline);
                render_pass.set_vertex_buffer(0, self.poly_vertex_buffer.slice(..));
                render_pass.draw(0..self.poly_vertices.len() as u32, 0..1);
            }

            if !self.line_vertices.is_empty() {
                render_pass.set_pipeline(&self.line_render_pipeline);
                render_pass.set_vertex_buffer(0, self.line_vertex_buffer.slice(..));
                render_pass.draw(0..self.line_vertices.len() as u32, 0..1);
            }

            if !self.circle_instances.is_empty() {
                render_pass.set_pipeline(&self.circle_render_pipeline);
                render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
                render_pass.set_vertex_buffer(1, self.circle_instance_buffer.slice(..));
                render_pass
                    .set_index_buffer(self.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(
                    0..Vertex2D::QUAD_INDICES.len() as u32,
                    0,
                    0..self.circle_instances.len() as u32,
                );
            }

            self.glyphon_renderer
                .render(&self.glyphon_atlas, &self.glyphon_viewport, &mut render_pass)
                .unwrap();
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.glyphon_atlas.trim();

        Ok(())
    }
}
