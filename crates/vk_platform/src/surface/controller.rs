//! Game controllers
//!
//! Controllers belong to no surface. The host polls every joystick slot from a
//! single thread with [`GlobalInputContext::update`] and reads the snapshots it
//! took. GLFW joystick queries must stay on the thread that initialised GLFW,
//! so the GLFW-backed context is neither `Send` nor `Sync`.

use bitflags::bitflags;

use super::{SurfaceError, SurfaceResult};

/// Joystick slots polled
pub const MAX_CONTROLLERS: u8 = 16;

bitflags! {
    /// Directions a hat switch is pushed towards; empty when centred
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HatState: u8 {
        /// Up
        const UP = 1 << 0;
        /// Right
        const RIGHT = 1 << 1;
        /// Down
        const DOWN = 1 << 2;
        /// Left
        const LEFT = 1 << 3;
    }
}

/// Raw readings of one joystick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoystickReading {
    /// Pressed state per button
    pub buttons: Vec<bool>,
    /// Axis positions in [-1, 1]
    pub axes: Vec<f32>,
    /// Hat switch directions
    pub hats: Vec<HatState>,
}

/// Where controller readings come from
pub trait JoystickSource {
    /// Whether slot `id` has a joystick connected
    fn is_present(&self, id: u8) -> bool;
    /// SDL-compatible GUID of the joystick in slot `id`
    fn guid(&self, id: u8) -> Option<String>;
    /// Current readings; `None` once the joystick is gone
    fn read(&self, id: u8) -> Option<JoystickReading>;
}

/// Joystick slots read through GLFW
pub struct GlfwJoysticks {
    glfw: glfw::Glfw,
}

impl GlfwJoysticks {
    /// Initialise GLFW on the calling thread
    pub fn new() -> SurfaceResult<Self> {
        let glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| SurfaceError::GlfwInit(format!("{e:?}")))?;
        Ok(Self { glfw })
    }

    fn joystick(&self, id: u8) -> Option<glfw::Joystick> {
        glfw::JoystickId::from_i32(i32::from(id))
            .map(|id| self.glfw.get_joystick(id))
            .filter(glfw::Joystick::is_present)
    }
}

impl JoystickSource for GlfwJoysticks {
    fn is_present(&self, id: u8) -> bool {
        self.joystick(id).is_some()
    }

    fn guid(&self, id: u8) -> Option<String> {
        self.joystick(id)?.get_guid()
    }

    fn read(&self, id: u8) -> Option<JoystickReading> {
        let joystick = self.joystick(id)?;
        Some(JoystickReading {
            buttons: joystick.get_buttons().into_iter().map(|b| b != 0).collect(),
            axes: joystick.get_axes(),
            hats: joystick
                .get_hats()
                .into_iter()
                .map(|hat| HatState::from_bits_truncate(u8::try_from(hat.bits()).unwrap_or(0)))
                .collect(),
        })
    }
}

/// Last polled state of one connected controller
#[derive(Debug, Clone, PartialEq)]
pub struct Controller {
    id: u8,
    guid: String,
    reading: JoystickReading,
}

impl Controller {
    /// Joystick slot
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Device GUID; identifies the model across slots and sessions
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Pressed state of every button
    pub fn buttons(&self) -> &[bool] {
        &self.reading.buttons
    }

    /// Whether `button` is held; false for buttons the device lacks
    pub fn button(&self, button: usize) -> bool {
        self.reading.buttons.get(button).copied().unwrap_or(false)
    }

    /// Position of every axis
    pub fn axes(&self) -> &[f32] {
        &self.reading.axes
    }

    /// Position of `axis`; 0 for axes the device lacks
    pub fn axis(&self, axis: usize) -> f32 {
        self.reading.axes.get(axis).copied().unwrap_or(0.0)
    }

    /// Direction of every hat switch
    pub fn hats(&self) -> &[HatState] {
        &self.reading.hats
    }

    /// Direction of `hat`; centred for hats the device lacks
    pub fn hat(&self, hat: usize) -> HatState {
        self.reading.hats.get(hat).copied().unwrap_or_default()
    }
}

/// Every connected controller, refreshed on [`update`](Self::update)
pub struct GlobalInputContext<S: JoystickSource = GlfwJoysticks> {
    source: S,
    controllers: Vec<Controller>,
}

impl GlobalInputContext {
    /// Context reading GLFW joysticks on the calling thread
    pub fn new() -> SurfaceResult<Self> {
        Ok(Self::with_source(GlfwJoysticks::new()?))
    }
}

impl<S: JoystickSource> GlobalInputContext<S> {
    /// Context over an arbitrary joystick source; nothing is polled until `update`
    pub const fn with_source(source: S) -> Self {
        Self {
            source,
            controllers: Vec::new(),
        }
    }

    /// Refresh every controller, dropping disconnected ones and adding new ones
    pub fn update(&mut self) {
        let source = &self.source;
        self.controllers.retain_mut(|controller| match source.read(controller.id) {
            Some(reading) => {
                controller.reading = reading;
                true
            }
            None => {
                log::info!("Controller {} disconnected", controller.id);
                false
            }
        });

        for id in 0..MAX_CONTROLLERS {
            if self.controllers.iter().any(|c| c.id == id) || !self.source.is_present(id) {
                continue;
            }
            let Some(reading) = self.source.read(id) else {
                continue;
            };
            let guid = self.source.guid(id).unwrap_or_default();
            log::info!("Controller {id} connected ({guid})");
            self.controllers.push(Controller { id, guid, reading });
        }
        self.controllers.sort_by_key(Controller::id);
    }

    /// Controllers connected at the last update, by slot
    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    /// Controller in joystick slot `id`
    pub fn controller(&self, id: u8) -> Option<&Controller> {
        self.controllers.iter().find(|c| c.id == id)
    }
}
