//! Shared-marker demo.
//!
//! Connects to the position relay in `demos/server` (start it with
//! `cargo run -p demo-server`, then `cargo run -p demo [ws://host:8091]`).
//! Holding the left mouse button sends `{"x", "y"}` as a binary JSON frame.
//! The server answers every 100 ms with `{"x", "y", "id"}`, the shared
//! position and the client that moved it last.

use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_ws_client::{SocketConfig, SocketPlugin, SocketPluginConfig, SocketResource};
use serde::{Deserialize, Serialize};

/// Position broadcast by the server, tagged with the client that moved it last.
#[derive(Deserialize)]
struct SharedPosition {
    x: f32,
    y: f32,
    id: u32,
}

#[derive(Serialize)]
struct MoveTo {
    x: f32,
    y: f32,
}

#[derive(Component)]
struct Marker;

#[derive(Component)]
struct EditedBy;

fn main() {
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:8091".to_string());

    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(SocketPlugin::new(
            SocketPluginConfig::new()
                .with_address(address)
                .with_socket_config(SocketConfig::default().with_max_messages(1024)),
        ))
        .add_systems(Startup, setup)
        .add_systems(Update, (receive_positions, send_clicks))
        .run();
}

fn setup(mut commands: Commands) {
    commands.spawn(Camera2d);
    commands.spawn((
        Marker,
        Sprite::from_color(Color::srgb(1.0, 0.0, 0.0), Vec2::splat(30.0)),
        Transform::default(),
    ));
    commands.spawn((
        EditedBy,
        Text2d::new("Connecting..."),
        Transform::from_xyz(0.0, 80.0, 0.0),
    ));
}

fn receive_positions(
    mut socket: ResMut<SocketResource>,
    mut marker: Query<&mut Transform, (With<Marker>, Without<EditedBy>)>,
    mut label: Query<(&mut Text2d, &mut Transform), (With<EditedBy>, Without<Marker>)>,
) {
    let Ok(mut marker) = marker.single_mut() else {
        return;
    };
    let Ok((mut text, mut label_transform)) = label.single_mut() else {
        return;
    };

    if !socket.is_connected() {
        text.0 = format!("Not connected ({:?})", socket.state());
        return;
    }

    // Only the newest position matters, but drain everything.
    while let Some(result) = socket.try_recv_json::<SharedPosition>() {
        match result {
            Ok(position) => {
                marker.translation = Vec3::new(position.x, position.y, 0.0);
                label_transform.translation = Vec3::new(position.x, position.y + 80.0, 0.0);
                text.0 = format!("Last edited by: {}", position.id);
            }
            Err(e) => warn!("Ignoring message: {}", e),
        }
    }
}

fn send_clicks(
    mut socket: ResMut<SocketResource>,
    buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform)>,
) {
    if !buttons.pressed(MouseButton::Left) || !socket.is_connected() {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    let Ok((camera, camera_transform)) = cameras.single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let Ok(world) = camera.viewport_to_world_2d(camera_transform, cursor) else {
        return;
    };

    if let Err(e) = socket.send_json(&MoveTo {
        x: world.x,
        y: world.y,
    }) {
        error!("Failed to send position: {}", e);
    }
}
