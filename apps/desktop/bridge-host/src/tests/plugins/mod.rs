mod math;
mod notes;
mod timer;
