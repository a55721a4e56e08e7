// src/main.rs
//
// Sanity run: render one seeded arrangement through every strategy and
// report signal statistics and real-time feasibility.

use std::rc::Rc;

use batchsynth::{
    build_runner, AudioStats, ChannelInfo, EngineConfig, FrameExpr, FrameOperation,
    MeasureClock, NoteArrangement, SceneContext, Strategy,
};

const SEED: u64 = 42;
const MEASURES: u32 = 4;
const BUFFERS: usize = 64;

fn main() {
    let config = EngineConfig::default();
    if let Err(e) = config.validate() {
        println!("Invalid configuration: {}", e);
        return;
    }

    let frames = BUFFERS * config.buffer_size;
    let clock = MeasureClock::new(120.0, 4.0, config.sample_rate as f64);

    println!(
        "Rendering {} frames ({:.2}s) at {} Hz, {} frames per buffer",
        frames,
        frames as f64 / config.sample_rate as f64,
        config.sample_rate,
        config.buffer_size
    );

    // --------------------------------
    // Strategies
    // --------------------------------

    let strategies = [
        ("bulk", Strategy::Bulk { frames }),
        ("real-time", Strategy::RealTime),
        ("compiled", Strategy::Compiled),
    ];

    for (name, strategy) in strategies {
        let scene = Rc::new(SceneContext::new(MEASURES, clock));
        let arrangement =
            NoteArrangement::generate(SEED, MEASURES, 1, config.sample_rate as f64);
        let operation =
            FrameOperation::fusable((FrameExpr::input() * FrameExpr::constant(1.5)).tanh());
        let (sink, captured) = batchsynth::sink::capture();

        let mut runner = match build_runner(
            strategy,
            &config,
            scene,
            arrangement,
            ChannelInfo::left(0),
            operation,
            sink,
        ) {
            Ok(runner) => runner,
            Err(e) => {
                println!("Error building {} runner: {}", name, e);
                continue;
            }
        };

        runner.setup();
        if let Err(e) = runner.run_frames(frames) {
            println!("Error running {} runner: {}", name, e);
            continue;
        }

        let stats = AudioStats::measure(&captured.borrow());
        let monitor = runner.monitor();

        println!("--- {} ---", name);
        println!(
            "peak {:.4}, rms {:.4}, non-zero {:.1}%",
            stats.peak,
            stats.rms,
            stats.non_zero_ratio * 100.0
        );
        println!(
            "{} buffers, avg {:?}, longest {:?}, budget {:?}, overruns {} ({})",
            monitor.buffers(),
            monitor.average_duration(),
            monitor.longest_duration(),
            monitor.budget(),
            monitor.overruns(),
            if monitor.is_feasible() { "feasible" } else { "not feasible" }
        );
    }

    println!("Sanity run completed.");
}
