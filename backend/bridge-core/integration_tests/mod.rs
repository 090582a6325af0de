mod dispatch;
mod helpers;
mod plugins;
mod ws_bridge;
