//! Win32 windowing and message pump.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use windows::{
    Win32::Foundation::*, Win32::System::LibraryLoader::GetModuleHandleW,
    Win32::UI::WindowsAndMessaging::*, core::*,
};

use crate::d3d11::{self, D3D11Gpu};
use crate::error::{Error, Result};
use crate::gpu::{Platform, SwapChainDesc, WindowDesc, WindowMessage};

const API: &str = "Win32";

/// The demo's window. Destroyed when dropped.
pub struct Win32Window {
    hwnd: HWND,
}

impl Win32Window {
    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }
}

impl Drop for Win32Window {
    fn drop(&mut self) {
        if let Err(err) = unsafe { DestroyWindow(self.hwnd) } {
            log::warn!("destroying window failed: {err}");
        }
    }
}

pub struct Win32Platform {
    interrupted: Arc<AtomicBool>,
}

impl Win32Platform {
    /// Opts out of DPI scaling and turns Ctrl-C into a quit message.
    pub fn new() -> Result<Self> {
        unsafe {
            if !SetProcessDPIAware().as_bool() {
                log::warn!("could not mark the process DPI aware");
            }
        }

        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        })
        .map_err(|e| Error::backend("Ctrl-C handler", e))?;

        Ok(Self { interrupted })
    }
}

impl Platform for Win32Platform {
    type Window = Win32Window;
    type Gpu = D3D11Gpu;

    fn create_window(&self, desc: &WindowDesc) -> Result<Win32Window> {
        let class_name = HSTRING::from(desc.class_name.as_str());
        let title = HSTRING::from(desc.title.as_str());

        unsafe {
            let instance = GetModuleHandleW(None).map_err(|e| Error::backend(API, e))?;

            let class = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(window_proc),
                hInstance: instance.into(),
                hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
                lpszClassName: PCWSTR(class_name.as_ptr()),
                ..Default::default()
            };
            if RegisterClassExW(&class) == 0 {
                return Err(Error::backend(
                    API,
                    windows::core::Error::from(GetLastError().to_hresult()),
                ));
            }

            let hwnd = CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                &class_name,
                &title,
                WS_OVERLAPPEDWINDOW | WS_VISIBLE,
                0,
                0,
                desc.size.width as i32,
                desc.size.height as i32,
                None,
                None,
                Some(instance.into()),
                None,
            )
            .map_err(|e| Error::backend(API, e))?;

            log::debug!("created window {:?}", desc.title);
            Ok(Win32Window { hwnd })
        }
    }

    fn create_gpu(&self, window: &Win32Window, desc: &SwapChainDesc) -> Result<D3D11Gpu> {
        d3d11::create_gpu(window.hwnd(), desc)
    }

    fn poll_message(&self) -> Option<WindowMessage> {
        if self.interrupted.swap(false, Ordering::Relaxed) {
            log::info!("interrupted");
            return Some(WindowMessage::Quit);
        }

        let mut msg = MSG::default();
        unsafe {
            if !PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                return None;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        Some(match msg.message {
            WM_QUIT => WindowMessage::Quit,
            WM_KEYDOWN => WindowMessage::KeyDown,
            _ => WindowMessage::Other,
        })
    }

    fn show_fatal_error(&self, title: &str, message: &str) {
        unsafe {
            MessageBoxW(
                None,
                &HSTRING::from(message),
                &HSTRING::from(title),
                MB_OK | MB_ICONERROR,
            );
        }
    }
}

extern "system" fn window_proc(window: HWND, message: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe {
        match message {
            WM_CLOSE | WM_DESTROY => {
                PostQuitMessage(0);
                LRESULT(0)
            }
            _ => DefWindowProcW(window, message, wparam, lparam),
        }
    }
}
