//! Renders a single static triangle to a head-mounted display using Direct3D 11.
//!
//! Press any key to recenter the view. Close the window or press Ctrl-C to exit.
//! Set `RUST_LOG=debug` for resource and session details.

use std::process::ExitCode;

use env_logger::Env;

pub fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    #[cfg(all(windows, feature = "static"))]
    #[link(name = "advapi32")]
    unsafe extern "C" {}

    run()
}

#[cfg(windows)]
fn run() -> ExitCode {
    use simple_hmd::app;
    use simple_hmd::config::DemoConfig;
    use simple_hmd::openxr_hmd::OpenXrRuntime;
    use simple_hmd::win32::Win32Platform;

    let result = Win32Platform::new().and_then(|platform| {
        let mut runtime = OpenXrRuntime::default();
        app::run(&platform, &mut runtime, &DemoConfig::default())
    });

    match result {
        Ok(summary) => {
            log::info!("exiting cleanly after {} frames", summary.frames);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

#[cfg(not(windows))]
fn run() -> ExitCode {
    log::error!("Direct3D 11 is only available on Windows");
    ExitCode::FAILURE
}
