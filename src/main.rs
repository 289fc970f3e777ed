/// Entry point and game loop.

mod config;
mod domain;
mod sim;
mod ui;

use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

use config::GameConfig;
use domain::point::{DOWN, LEFT, RIGHT, UP};
use sim::game::Game;
use sim::save;
use ui::renderer::Renderer;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const DEFAULT_SLOT: &str = "game";

fn main() {
    let config = GameConfig::load();

    let mut game = Game::new();
    let level = config.start_level.as_deref().and_then(|name| {
        let path = save::level_path(&config.levels_dir, name);
        match save::load_file(&path) {
            Ok(level) => Some(level),
            Err(e) => {
                eprintln!("Warning: could not load {}: {e}", path.display());
                None
            }
        }
    });
    let (map, options) = level.unwrap_or_else(save::starter_level);
    game.install(map, options);
    let first_result = game.start().unwrap_or_default().to_string();

    let mut renderer = Renderer::new();
    if let Err(e) = renderer.init() {
        eprintln!("Terminal init failed: {e}");
        return;
    }

    let outcome = game_loop(&mut game, &mut renderer, &config, first_result);

    if let Err(e) = renderer.cleanup() {
        eprintln!("Terminal cleanup failed: {e}");
    }
    if let Err(e) = outcome {
        eprintln!("Game error: {e}");
    }
}

fn game_loop(
    game: &mut Game,
    renderer: &mut Renderer,
    config: &GameConfig,
    mut result: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(config.tick_rate_ms);
    let mut last_tick = Instant::now();
    let mut command = String::new();
    let mut dirty = true;

    loop {
        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('c')
                            if key.modifiers.contains(KeyModifiers::CONTROL) =>
                        {
                            break;
                        }
                        KeyCode::Up => game.move_player(UP),
                        KeyCode::Down => game.move_player(DOWN),
                        KeyCode::Left => game.move_player(LEFT),
                        KeyCode::Right => game.move_player(RIGHT),
                        KeyCode::Backspace => {
                            command.pop();
                            dirty = true;
                        }
                        KeyCode::Enter => {
                            let line = std::mem::take(&mut command);
                            match do_command(game, config, line.trim()) {
                                CommandOutcome::Quit => break,
                                CommandOutcome::Message(msg) => result = msg,
                            }
                            dirty = true;
                        }
                        KeyCode::Char(c) => {
                            command.push(c);
                            dirty = true;
                        }
                        _ => {}
                    }
                    if let Some(msg) = game.check_game_state() {
                        result = msg.to_string();
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            game.update_cells();
            if let Some(msg) = game.check_game_state() {
                result = msg.to_string();
            }
            last_tick = Instant::now();
        }

        if game.map_changed || dirty {
            renderer.render(game, &command, &result)?;
            game.map_changed = false;
            dirty = false;
        }
    }
    Ok(())
}

enum CommandOutcome {
    Quit,
    Message(String),
}

fn do_command(game: &mut Game, config: &GameConfig, line: &str) -> CommandOutcome {
    use CommandOutcome::Message;

    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Message(String::new());
    };
    let arg = parts.next();

    match verb.to_ascii_lowercase().as_str() {
        "quit" | "exit" => CommandOutcome::Quit,
        "help" => Message(
            "Commands: help about quit levels load [file] save [file] \
             options gravity movelimit iddqd addmoves N setforce N"
                .into(),
        ),
        "about" => Message(
            "crateshift: push every crate onto a cage. Arrows move, \
             commands run on Enter."
                .into(),
        ),
        "levels" => {
            let names = save::list_levels(&config.levels_dir);
            if names.is_empty() {
                Message("No level files found".into())
            } else {
                Message(names.join(", "))
            }
        }
        "load" => {
            let path = save::level_path(&config.levels_dir, arg.unwrap_or(DEFAULT_SLOT));
            match save::load_file(&path) {
                Ok((map, options)) => {
                    game.install(map, options);
                    match game.start() {
                        Some(state) => Message(state.to_string()),
                        None => Message(format!("Loaded {}", path.display())),
                    }
                }
                Err(e) => Message(format!("Load failed: {e}")),
            }
        }
        "save" => {
            let path = save::level_path(&config.levels_dir, arg.unwrap_or(DEFAULT_SLOT));
            match save::save_file(&path, &game.map, &game.options) {
                Ok(()) => Message(format!("Saved {}", path.display())),
                Err(e) => Message(format!("Save failed: {e}")),
            }
        }
        "options" => Message(game.option_list()),
        "gravity" | "movelimit" | "iddqd" => Message(
            game.toggle_option(verb)
                .unwrap_or_else(|| "Unknown option".into()),
        ),
        "addmoves" => match arg.map(str::parse::<i32>) {
            Some(Ok(count)) => match game.add_moves(count) {
                Some(added) => Message(format!("Added {added} moves")),
                None => Message("addmoves needs a positive count".into()),
            },
            _ => Message("Usage: addmoves N".into()),
        },
        "setforce" => match arg.map(str::parse::<i32>) {
            Some(Ok(force)) => {
                if game.set_force(force) {
                    Message(format!("Force is now {}", game.map.player().force))
                } else {
                    Message("setforce needs a positive value".into())
                }
            }
            _ => Message("Usage: setforce N".into()),
        },
        other => Message(format!("Unknown command: {other}")),
    }
}
