//! Plugins shipped with the host.

pub mod math;
pub mod notes;
pub mod timer;

pub use math::MathPlugin;
pub use notes::NotesPlugin;
pub use timer::TimerPlugin;

use bridge_core::plugin::Plugin;

/// Every bundled plugin, in registration order.
pub fn builtin_plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(MathPlugin::new()),
        Box::new(TimerPlugin::new()),
        Box::new(NotesPlugin::new()),
    ]
}
