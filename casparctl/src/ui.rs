use crate::watch::Panel;
use caspar_amcp::{ConnectionStatusDetails, Mode};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};

const FOREGROUND: Color = Color::Rgb(197, 201, 199);
const GRAY: Color = Color::Rgb(164, 167, 164);
const GREEN: Color = Color::Rgb(138, 154, 123);
const RED: Color = Color::Rgb(228, 104, 118);
const YELLOW: Color = Color::Rgb(196, 178, 138);
const BLUE: Color = Color::Rgb(127, 180, 202);

pub fn draw(f: &mut Frame, panel: &Panel) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(9),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, chunks[0]);
    draw_status(f, chunks[1], panel.status.as_ref());
    draw_footer(f, chunks[2], &panel.message);
}

fn draw_header(f: &mut Frame, area: Rect) {
    let text = Line::from(vec![
        Span::raw("⟪ "),
        Span::styled(
            "CASPAR CLOCK",
            Style::default().fg(BLUE).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ⟫"),
    ]);
    f.render_widget(
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::BOTTOM)),
        area,
    );
}

fn row(label: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<16}"), Style::default().fg(GRAY)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn on_off(flag: bool) -> (String, Color) {
    if flag {
        ("On".to_string(), GREEN)
    } else {
        ("Off".to_string(), GRAY)
    }
}

fn status_lines(status: &ConnectionStatusDetails) -> Vec<Line<'static>> {
    let (connection, connection_color) = match (status.is_connected, status.mode) {
        (true, _) => ("Connected".to_string(), GREEN),
        (false, Mode::Mock) => ("Preview mode".to_string(), YELLOW),
        (false, Mode::Real) => ("Disconnected".to_string(), RED),
    };
    let mode = match status.mode {
        Mode::Real => "real",
        Mode::Mock => "mock",
    };
    let (visible, visible_color) = if status.is_visible {
        ("Visible".to_string(), GREEN)
    } else {
        ("Hidden".to_string(), GRAY)
    };
    let (auto, auto_color) = on_off(status.auto_update_enabled);
    let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

    vec![
        row("Connection", connection, connection_color),
        row("Mode", mode.to_string(), FOREGROUND),
        row("On air time", or_dash(&status.current_time), FOREGROUND),
        row("Overlay", visible, visible_color),
        row("Auto-update", auto, auto_color),
        row("Next update", or_dash(&status.next_update_time), FOREGROUND),
        row("Last command", or_dash(&status.last_command), BLUE),
    ]
}

fn draw_status(f: &mut Frame, area: Rect, status: Option<&ConnectionStatusDetails>) {
    let block = Block::default()
        .title(Span::styled(" Status ", Style::default().fg(GRAY)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(GREEN));
    let body = match status {
        Some(status) => Paragraph::new(status_lines(status)),
        None => Paragraph::new("casparclock is not reachable")
            .style(Style::default().fg(RED))
            .alignment(Alignment::Center),
    };
    f.render_widget(body.block(block), area);
}

fn draw_footer(f: &mut Frame, area: Rect, message: &str) {
    let keys = "c connect │ u update │ o show │ f hide │ a auto │ q quit";
    let text = vec![
        Line::from(Span::styled(message.to_string(), Style::default().fg(FOREGROUND))),
        Line::from(Span::styled(keys, Style::default().fg(GRAY))),
    ];
    f.render_widget(
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::TOP)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn rendered(panel: &Panel) -> String {
        let mut terminal = Terminal::new(TestBackend::new(70, 18)).unwrap();
        terminal.draw(|f| draw(f, panel)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn shows_status_fields() {
        let mut panel = Panel::new();
        panel.status = Some(ConnectionStatusDetails {
            is_connected: true,
            current_time: Some("14:30".to_string()),
            is_visible: true,
            auto_update_enabled: true,
            last_command: Some("CG 1 ADD 1 main/MAIN 1".to_string()),
            next_update_time: Some("14:31:00".to_string()),
            mode: Mode::Real,
        });
        panel.message = "Connected and template added".to_string();

        let screen = rendered(&panel);
        assert!(screen.contains("Connected"));
        assert!(screen.contains("14:30"));
        assert!(screen.contains("14:31:00"));
        assert!(screen.contains("Visible"));
        assert!(screen.contains("CG 1 ADD 1 main/MAIN 1"));
    }

    #[test]
    fn unreachable_daemon_is_reported() {
        let screen = rendered(&Panel::new());
        assert!(screen.contains("casparclock is not reachable"));
        assert!(screen.contains("Waiting for casparclock"));
    }
}
