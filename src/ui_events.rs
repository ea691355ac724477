use crate::app_state::State;
use crate::scene::network::DeviceNetwork;
use crate::scene::scene::scene_pixel_bounds;

#[derive(Debug)]
pub enum UserCommand {
    /// Replaces the whole scene with a freshly supplied document.
    SetDeviceNetwork(DeviceNetwork),
    ToggleFilter(FilterToggle),
    ClearSelection,
    StateInitialized, // Notifies App that State setup is complete
}

#[derive(Debug, Clone, Copy)]
pub enum FilterToggle {
    MyDevices,
    MyAgents,
    TokenHoldings,
    ShowAll,
}

impl State {
    pub fn process_command(&mut self, command: UserCommand) {
        match command {
            UserCommand::SetDeviceNetwork(mut network) => {
                let repairs = network.validate();
                log::info!(
                    "Loaded device network: {} device(s), {} agent(s), {} reference repair(s).",
                    network.devices.len(),
                    network.agents.len(),
                    repairs
                );

                let (min, max) = scene_pixel_bounds(network.grid_size);
                self.camera.frame_bounds(min, max);
                self.camera_needs_update = true;

                self.scene.clear_selection();
                self.flow.clear();
                self.movements = Default::default();
                self.network = Some(network);
            }
            UserCommand::ToggleFilter(toggle) => {
                let filters = &mut self.scene.filters;
                match toggle {
                    FilterToggle::MyDevices => filters.show_my_devices = !filters.show_my_devices,
                    FilterToggle::MyAgents => filters.show_my_agents = !filters.show_my_agents,
                    FilterToggle::TokenHoldings => {
                        filters.show_token_holdings = !filters.show_token_holdings
                    }
                    FilterToggle::ShowAll => filters.show_all = !filters.show_all,
                }
                log::info!("Filters now {:?}", filters);
            }
            UserCommand::ClearSelection => {
                self.scene.clear_selection();
            }
            UserCommand::StateInitialized => {
                // Handled in App::user_event.
            }
        }
    }
}
