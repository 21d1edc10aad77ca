//! Drives a small status bar through a few frames and prints what each
//! frame cost.
//!
//! ```bash
//! RUST_LOG=guido_chain=trace cargo run --example frame_loop
//! ```

use guido_chain::prelude::*;

fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let mut renderer = Renderer::new(ChainConfig::default().text_regen_budget(2));
    let handle = renderer.create_panel();
    let panel = renderer.panel_mut(handle)?;
    let root = panel.root();

    let bar = panel.add_child(
        root,
        Element::new()
            .with_rect(0.0, 0.0, 800.0, 32.0)
            .with_background(Color::rgb(0.1, 0.1, 0.15))
            .with_radii(CornerRadii::uniform(8.0))
            .with_overflow_hidden(),
    )?;
    let clock = panel.add_child(
        bar,
        Element::new()
            .with_rect(700.0, 6.0, 90.0, 20.0)
            .with_text(TextContent::new("12:00")),
    )?;
    let workspaces: Vec<ElementId> = (0..4)
        .map(|i| {
            panel.add_child(
                bar,
                Element::new()
                    .with_rect(8.0 + i as f32 * 28.0, 4.0, 24.0, 24.0)
                    .with_background(Color::rgb(0.3, 0.3, 0.4))
                    .with_radii(CornerRadii::uniform(4.0)),
            )
        })
        .collect::<Result<_>>()?;
    let indicator = panel.add_child(
        bar,
        Element::new()
            .with_rect(8.0, 28.0, 24.0, 2.0)
            .with_background(Color::WHITE)
            .with_hints(RenderHints::BONE_TRANSFORM),
    )?;

    let mut frame = 0;
    let mut run = |renderer: &mut Renderer| {
        for (handle, report) in renderer.update_all() {
            match report {
                Ok(report) => log::info!(
                    "frame {} {:?}: {} commands, {}",
                    frame,
                    handle,
                    renderer.panel(handle).map(|p| p.chain().commands().len()).unwrap_or(0),
                    report.stats.summary()
                ),
                Err(err) => log::error!("frame {} {:?} failed: {}", frame, handle, err),
            }
        }
        frame += 1;
    };

    run(&mut renderer);

    // Switching workspace slides the indicator and fades the others.
    let panel = renderer.panel_mut(handle)?;
    panel.set_position(indicator, 36.0, 28.0)?;
    for (i, &workspace) in workspaces.iter().enumerate() {
        panel.set_opacity(workspace, if i == 1 { 1.0 } else { 0.6 })?;
    }
    run(&mut renderer);

    let panel = renderer.panel_mut(handle)?;
    panel.set_text(clock, Some(TextContent::new("12:01")))?;
    run(&mut renderer);

    // An atlas reset regenerates every label in one frame.
    renderer.panel_mut(handle)?.on_font_atlas_reset();
    run(&mut renderer);

    // A regen request is spread over frames, two labels at a time.
    renderer.panel_mut(handle)?.request_text_regen()?;
    run(&mut renderer);

    Ok(())
}
