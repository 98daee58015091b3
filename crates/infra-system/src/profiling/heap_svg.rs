// Stacked bar chart of heap usage per process, rendered as plain SVG
use std::fmt::Write as _;

use super::memcheck::ProcessMemory;

const BAR_WIDTH: u32 = 48;
const BAR_GAP: u32 = 32;
const CHART_HEIGHT: u32 = 240;
const MARGIN: u32 = 40;
const LEGEND_WIDTH: u32 = 170;

/// (label, colour, value) for each stacked segment, bottom to top
fn segments(p: &ProcessMemory) -> [(&'static str, &'static str, u64); 5] {
    [
        ("freed", "#9bc99b", p.freed()),
        ("still reachable", "#8fb4d9", p.still_reachable),
        ("possibly lost", "#f2c14e", p.possibly_lost),
        ("indirectly lost", "#f08a4b", p.indirectly_lost),
        ("definitely lost", "#d64545", p.definitely_lost),
    ]
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(super) fn render(processes: &[ProcessMemory]) -> String {
    let count = processes.len().max(1) as u32;
    let plot_width = count * (BAR_WIDTH + BAR_GAP) + BAR_GAP;
    let width = MARGIN * 2 + plot_width + LEGEND_WIDTH;
    let height = MARGIN * 2 + CHART_HEIGHT + 20;
    let baseline = MARGIN + CHART_HEIGHT;

    let max_total = processes
        .iter()
        .map(|p| segments(p).iter().map(|(_, _, v)| *v).sum::<u64>())
        .max()
        .unwrap_or(0)
        .max(1);

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" font-family=\"sans-serif\" font-size=\"11\">\n",
        w = width,
        h = height
    );
    let _ = writeln!(svg, "<rect width=\"100%\" height=\"100%\" fill=\"white\"/>");
    let _ = writeln!(
        svg,
        "<text x=\"{}\" y=\"{}\" font-size=\"14\">Heap usage per process (bytes)</text>",
        MARGIN,
        MARGIN / 2 + 4
    );
    let _ = writeln!(
        svg,
        "<line x1=\"{x}\" y1=\"{y}\" x2=\"{x2}\" y2=\"{y}\" stroke=\"black\"/>",
        x = MARGIN,
        x2 = MARGIN + plot_width,
        y = baseline
    );

    for (i, p) in processes.iter().enumerate() {
        let x = MARGIN + BAR_GAP + i as u32 * (BAR_WIDTH + BAR_GAP);
        let mut top = baseline as f64;
        for (label, colour, value) in segments(p) {
            if value == 0 {
                continue;
            }
            let h = value as f64 / max_total as f64 * CHART_HEIGHT as f64;
            top -= h;
            let _ = writeln!(
                svg,
                "<rect x=\"{}\" y=\"{:.1}\" width=\"{}\" height=\"{:.1}\" fill=\"{}\"><title>{}: {} bytes</title></rect>",
                x,
                top,
                BAR_WIDTH,
                h,
                colour,
                escape(label),
                value
            );
        }
        let _ = writeln!(
            svg,
            "<text x=\"{}\" y=\"{}\" text-anchor=\"middle\">PID {}</text>",
            x + BAR_WIDTH / 2,
            baseline + 14,
            p.pid
        );
    }

    let legend_x = MARGIN + plot_width + 16;
    let template = ProcessMemory::default();
    for (row, (label, colour, _)) in segments(&template).iter().rev().enumerate() {
        let y = MARGIN + row as u32 * 18;
        let _ = writeln!(
            svg,
            "<rect x=\"{}\" y=\"{}\" width=\"12\" height=\"12\" fill=\"{}\"/><text x=\"{}\" y=\"{}\">{}</text>",
            legend_x,
            y,
            colour,
            legend_x + 18,
            y + 10,
            escape(label)
        );
    }

    svg.push_str("</svg>\n");
    svg
}
