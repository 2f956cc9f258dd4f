//! Terminal renderer: a ratatui canvas of the world next to a metrics
//! sidebar. The simulation advances on host frame time; drawing uses the
//! interpolation alpha the kernel returns.

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use outbreak_core::{AgentKind, AgentState, Simulation};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::Line,
    widgets::{
        canvas::{Canvas, Line as CanvasLine, Points},
        Block, Borders, Gauge, Paragraph,
    },
    Frame, Terminal,
};

const FRAME_SLEEP: Duration = Duration::from_millis(15);

pub fn run(sim: &mut Simulation) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = event_loop(sim, &mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn event_loop(
    sim: &mut Simulation,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
) -> Result<()> {
    let mut last_frame = Instant::now();
    loop {
        let frame_dt = last_frame.elapsed().as_secs_f32();
        last_frame = Instant::now();
        let alpha = sim.advance(frame_dt);

        terminal.draw(|frame| draw_ui(frame, sim, alpha))?;

        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char(' ') => sim.toggle_pause(),
                    KeyCode::Char('+') | KeyCode::Char('=') => {
                        sim.set_time_scale(sim.time_scale() * 2.0);
                    }
                    KeyCode::Char('-') => sim.set_time_scale(sim.time_scale() * 0.5),
                    KeyCode::Char('g') => sim.toggle_debug_grid(),
                    _ => {}
                }
            }
        }

        std::thread::sleep(FRAME_SLEEP);
    }
}

fn draw_ui(frame: &mut Frame<'_>, sim: &Simulation, alpha: f32) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(34)])
        .split(frame.area());

    draw_world(frame, sim, alpha, chunks[0]);
    draw_sidebar(frame, sim, chunks[1]);
}

fn draw_world(frame: &mut Frame<'_>, sim: &Simulation, alpha: f32, area: ratatui::layout::Rect) {
    let w = f64::from(sim.config().world_width);
    let h = f64::from(sim.config().world_height);
    let world_w = sim.config().world_width;
    let world_h = sim.config().world_height;

    // Bucket render positions by color group. Canvas y grows upward, world
    // y grows downward, so flip.
    let mut civilians = Vec::new();
    let mut zombies = Vec::new();
    let mut heroes = Vec::new();
    let mut bitten = Vec::new();
    let mut dead = Vec::new();
    for view in sim.agents() {
        let p = view.render_position(alpha, world_w, world_h);
        let coord = (f64::from(p.x), h - f64::from(p.y));
        match view.state {
            AgentState::Bitten => bitten.push(coord),
            AgentState::Dead => dead.push(coord),
            _ => match view.kind {
                AgentKind::Civilian => civilians.push(coord),
                AgentKind::Zombie => zombies.push(coord),
                AgentKind::Hero => heroes.push(coord),
            },
        }
    }

    let canvas = Canvas::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" outbreak / {} agents ", sim.agent_count())),
        )
        .x_bounds([0.0, w])
        .y_bounds([0.0, h])
        .paint(|ctx| {
            if sim.is_debug_grid_enabled() {
                let cell = f64::from(sim.grid().cell_size());
                let mut x = 0.0;
                while x <= w {
                    ctx.draw(&CanvasLine {
                        x1: x,
                        y1: 0.0,
                        x2: x,
                        y2: h,
                        color: Color::Indexed(236),
                    });
                    x += cell;
                }
                let mut y = 0.0;
                while y <= h {
                    ctx.draw(&CanvasLine {
                        x1: 0.0,
                        y1: y,
                        x2: w,
                        y2: y,
                        color: Color::Indexed(236),
                    });
                    y += cell;
                }
            }

            for rect in &sim.environment().buildings {
                let (x1, x2) = (f64::from(rect.min.x), f64::from(rect.max.x));
                let (y1, y2) = (h - f64::from(rect.min.y), h - f64::from(rect.max.y));
                ctx.draw(&CanvasLine { x1, y1, x2, y2: y1, color: Color::DarkGray });
                ctx.draw(&CanvasLine { x1, y1: y2, x2, y2, color: Color::DarkGray });
                ctx.draw(&CanvasLine { x1, y1, x2: x1, y2, color: Color::DarkGray });
                ctx.draw(&CanvasLine { x1: x2, y1, x2, y2, color: Color::DarkGray });
            }

            ctx.draw(&Points {
                coords: &dead,
                color: Color::Indexed(240),
            });
            ctx.draw(&Points {
                coords: &civilians,
                color: Color::Gray,
            });
            ctx.draw(&Points {
                coords: &bitten,
                color: Color::Yellow,
            });
            ctx.draw(&Points {
                coords: &zombies,
                color: Color::Red,
            });
            ctx.draw(&Points {
                coords: &heroes,
                color: Color::Green,
            });

            for beam in sim.beams() {
                ctx.draw(&CanvasLine {
                    x1: f64::from(beam.from.x),
                    y1: h - f64::from(beam.from.y),
                    x2: f64::from(beam.to.x),
                    y2: h - f64::from(beam.to.y),
                    color: Color::LightYellow,
                });
            }
        });
    frame.render_widget(canvas, area);
}

fn draw_sidebar(frame: &mut Frame<'_>, sim: &Simulation, area: ratatui::layout::Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(10)])
        .split(area);

    let timings = sim.timings();
    let budget = sim.config().tick_budget_ms;
    let ratio = f64::from((timings.total_ms / budget).clamp(0.0, 1.0));
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" tick budget "))
        .gauge_style(Style::default().fg(if timings.total_ms < budget {
            Color::Green
        } else {
            Color::Red
        }))
        .ratio(ratio)
        .label(format!("{:.2} / {budget:.1} ms", timings.total_ms));
    frame.render_widget(gauge, rows[0]);

    let counts = sim.population();
    let lines = vec![
        Line::from(format!("tick        {}", sim.tick_count())),
        Line::from(format!(
            "status      {}",
            if sim.is_paused() { "paused" } else { "running" }
        )),
        Line::from(format!("time scale  {:.3}x", sim.time_scale())),
        Line::from(""),
        Line::from(format!("hash        {:.3} ms", timings.spatial_hash_ms)),
        Line::from(format!("separation  {:.3} ms", timings.separation_ms)),
        Line::from(format!("behavior    {:.3} ms", timings.behavior_ms)),
        Line::from(format!("movement    {:.3} ms", timings.movement_ms)),
        Line::from(format!("combat      {:.3} ms", timings.combat_ms)),
        Line::from(""),
        Line::from(format!("workers     {}", sim.worker_count())),
        Line::from(format!("jobs/tick   {}", sim.jobs_executed())),
        Line::from(format!("max cell    {}", sim.max_cell_occupancy())),
        Line::from(""),
        Line::from(format!("civilians   {}", counts.civilians)),
        Line::from(format!("zombies     {}", counts.zombies)),
        Line::from(format!("heroes      {}", counts.heroes)),
        Line::from(format!("bitten      {}", counts.bitten)),
        Line::from(format!("dead        {}", counts.dead)),
        Line::from(""),
        Line::from("space pause  +/- speed"),
        Line::from("g grid       q quit"),
    ];
    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" metrics "));
    frame.render_widget(panel, rows[1]);
}
