//! EGL + GLES2 implementation of [`GpuImporter`].
//!
//! The context is created once against the client's `wl_display` and made
//! current on a 1x1 pbuffer; all drawing goes to framebuffers backed by
//! imported dma-bufs, so no window surface is ever needed.

use std::ffi::c_void;
use std::os::fd::AsRawFd;
use std::ptr::{self, NonNull};

use glow::HasContext;
use khronos_egl as egl;
use tracing::{debug, error, info, warn};

use super::{DmabufPlane, GpuImporter};
use crate::error::ImportError;

type Egl = egl::DynamicInstance<egl::EGL1_4>;

// EGL_EXT_image_dma_buf_import
const EGL_LINUX_DMA_BUF_EXT: u32 = 0x3270;
const EGL_LINUX_DRM_FOURCC_EXT: i32 = 0x3271;
const EGL_DMA_BUF_PLANE0_FD_EXT: i32 = 0x3272;
const EGL_DMA_BUF_PLANE0_OFFSET_EXT: i32 = 0x3273;
const EGL_DMA_BUF_PLANE0_PITCH_EXT: i32 = 0x3274;

type CreateImageKhr = unsafe extern "system" fn(
    *mut c_void,  // EGLDisplay
    *mut c_void,  // EGLContext
    u32,          // target
    *mut c_void,  // EGLClientBuffer
    *const i32,   // attrib list
) -> *mut c_void;
type DestroyImageKhr = unsafe extern "system" fn(*mut c_void, *mut c_void) -> u32;
type ImageTargetTexture2dOes = unsafe extern "system" fn(u32, *mut c_void);

/// An `EGLImageKHR` that is known not to be `EGL_NO_IMAGE_KHR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EglImage(NonNull<c_void>);

impl EglImage {
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

fn egl_error(context: &str, err: egl::Error) -> ImportError {
    error!("{}: {}", context, err);
    ImportError::Egl(format!("{}: {}", context, err))
}

/// Whole-word search in a space separated extension string.
pub fn has_extension(extensions: &str, name: &str) -> bool {
    extensions.split_whitespace().any(|ext| ext == name)
}

fn load_proc<T: Copy>(egl: &Egl, name: &'static str) -> Result<T, ImportError> {
    let f = egl
        .get_proc_address(name)
        .ok_or(ImportError::MissingEntryPoint(name))?;
    debug_assert_eq!(std::mem::size_of::<T>(), std::mem::size_of_val(&f));
    // SAFETY: `T` is one of the extern "system" fn types above, matching the
    // signature of `name` in the EGL/GLES extension registry.
    Ok(unsafe { std::mem::transmute_copy::<extern "system" fn(), T>(&f) })
}

struct ContextParts {
    context: egl::Context,
    pbuffer: egl::Surface,
    gl: glow::Context,
    create_image_khr: CreateImageKhr,
    destroy_image_khr: DestroyImageKhr,
    image_target_texture_2d_oes: ImageTargetTexture2dOes,
}

/// GLES2 context able to import dma-bufs as render targets.
pub struct EglImporter {
    egl: Egl,
    display: egl::Display,
    context: egl::Context,
    pbuffer: egl::Surface,
    gl: glow::Context,
    create_image_khr: CreateImageKhr,
    destroy_image_khr: DestroyImageKhr,
    image_target_texture_2d_oes: ImageTargetTexture2dOes,
}

impl EglImporter {
    /// Sets up EGL on `native_display` (a `wl_display *`).
    ///
    /// Fails when libEGL cannot be loaded, the display cannot be initialized,
    /// `EGL_EXT_image_dma_buf_import` or `GL_OES_EGL_image` is missing, or no
    /// 32-bit ES2 config exists.
    pub fn new(native_display: *mut c_void) -> Result<Self, ImportError> {
        // SAFETY: loading libEGL runs no code beyond the library constructors.
        let egl = unsafe { Egl::load_required() }
            .map_err(|e| ImportError::Egl(format!("failed to load libEGL: {}", e)))?;

        // SAFETY: `native_display` is the live wl_display of this client's connection.
        let display = unsafe { egl.get_display(native_display) }.ok_or_else(|| {
            error!("Failed to create EGLDisplay");
            ImportError::Egl("eglGetDisplay returned EGL_NO_DISPLAY".to_string())
        })?;

        let (major, minor) = egl
            .initialize(display)
            .map_err(|e| egl_error("Failed to initialize EGLDisplay", e))?;
        info!("EGL initialized, version {}.{}", major, minor);

        match Self::set_up_context(&egl, display) {
            Ok(parts) => Ok(Self {
                egl,
                display,
                context: parts.context,
                pbuffer: parts.pbuffer,
                gl: parts.gl,
                create_image_khr: parts.create_image_khr,
                destroy_image_khr: parts.destroy_image_khr,
                image_target_texture_2d_oes: parts.image_target_texture_2d_oes,
            }),
            Err(err) => {
                // Terminating the display also releases any context or surface
                // created on it before the failure.
                let _ = egl.make_current(display, None, None, None);
                if egl.terminate(display).is_err() {
                    warn!("eglTerminate failed while unwinding EGL setup");
                }
                Err(err)
            }
        }
    }

    fn set_up_context(egl: &Egl, display: egl::Display) -> Result<ContextParts, ImportError> {
        egl.bind_api(egl::OPENGL_ES_API)
            .map_err(|e| egl_error("Failed to bind OpenGL ES API", e))?;

        let egl_extensions = egl
            .query_string(Some(display), egl::EXTENSIONS)
            .map_err(|e| egl_error("eglQueryString(EGL_EXTENSIONS) failed", e))?
            .to_string_lossy()
            .into_owned();
        if !has_extension(&egl_extensions, "EGL_EXT_image_dma_buf_import") {
            error!("EGL_EXT_image_dma_buf_import not supported");
            return Err(ImportError::MissingExtension("EGL_EXT_image_dma_buf_import"));
        }

        let config = Self::choose_config(egl, display)?;

        let context = egl
            .create_context(display, config, None, &[egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE])
            .map_err(|e| egl_error("eglCreateContext failed", e))?;

        let pbuffer = egl
            .create_pbuffer_surface(display, config, &[egl::WIDTH, 1, egl::HEIGHT, 1, egl::NONE])
            .map_err(|e| egl_error("eglCreatePbufferSurface failed", e))?;

        egl.make_current(display, Some(pbuffer), Some(pbuffer), Some(context))
            .map_err(|e| egl_error("Failed to make EGL context current", e))?;

        // SAFETY: the context is current on this thread and the loader returns
        // entry points of that context's client API.
        let gl = unsafe {
            glow::Context::from_loader_function(|name| {
                egl.get_proc_address(name)
                    .map_or(ptr::null(), |f| f as *const c_void)
            })
        };
        if !gl.supported_extensions().contains("GL_OES_EGL_image") {
            error!("GL_OES_EGL_image not supported");
            return Err(ImportError::MissingExtension("GL_OES_EGL_image"));
        }

        Ok(ContextParts {
            context,
            pbuffer,
            gl,
            create_image_khr: load_proc(egl, "eglCreateImageKHR")?,
            destroy_image_khr: load_proc(egl, "eglDestroyImageKHR")?,
            image_target_texture_2d_oes: load_proc(egl, "glEGLImageTargetTexture2DOES")?,
        })
    }

    fn choose_config(egl: &Egl, display: egl::Display) -> Result<egl::Config, ImportError> {
        let attribs = [
            egl::SURFACE_TYPE, egl::PBUFFER_BIT,
            egl::RED_SIZE, 1,
            egl::GREEN_SIZE, 1,
            egl::BLUE_SIZE, 1,
            egl::ALPHA_SIZE, 1,
            egl::RENDERABLE_TYPE, egl::OPENGL_ES2_BIT,
            egl::NONE,
        ];

        let count = egl
            .get_config_count(display)
            .map_err(|e| egl_error("eglGetConfigs failed", e))?;
        if count == 0 {
            return Err(ImportError::Egl("display exposes no EGL configs".to_string()));
        }

        let mut configs = Vec::with_capacity(count);
        egl.choose_config(display, &attribs, &mut configs)
            .map_err(|e| egl_error("eglChooseConfig failed", e))?;

        configs
            .into_iter()
            .find(|&config| matches!(egl.get_config_attrib(display, config, egl::BUFFER_SIZE), Ok(32)))
            .ok_or_else(|| {
                error!("did not find config with buffer size 32");
                ImportError::Egl("did not find config with buffer size 32".to_string())
            })
    }

    fn make_current(&self) -> Result<(), ImportError> {
        self.egl
            .make_current(self.display, Some(self.pbuffer), Some(self.pbuffer), Some(self.context))
            .map_err(|e| egl_error("Failed to make EGL context current", e))
    }
}

impl GpuImporter for EglImporter {
    type Image = EglImage;
    type Texture = glow::NativeTexture;
    type Framebuffer = glow::NativeFramebuffer;

    fn create_image(&self, plane: &DmabufPlane<'_>) -> Result<EglImage, ImportError> {
        let attribs: [i32; 13] = [
            egl::WIDTH, plane.width as i32,
            egl::HEIGHT, plane.height as i32,
            EGL_LINUX_DRM_FOURCC_EXT, plane.fourcc as i32,
            EGL_DMA_BUF_PLANE0_FD_EXT, plane.fd.as_raw_fd(),
            EGL_DMA_BUF_PLANE0_OFFSET_EXT, plane.offset as i32,
            EGL_DMA_BUF_PLANE0_PITCH_EXT, plane.stride as i32,
            egl::NONE,
        ];
        // SAFETY: the display is initialized, the attribute list is NONE-terminated
        // and the fd stays open for the duration of the call (EGL dups it).
        let raw = unsafe {
            (self.create_image_khr)(
                self.display.as_ptr(),
                ptr::null_mut(),
                EGL_LINUX_DMA_BUF_EXT,
                ptr::null_mut(),
                attribs.as_ptr(),
            )
        };
        NonNull::new(raw).map(EglImage).ok_or_else(|| {
            error!("EGLImageKHR creation failed");
            ImportError::NoImage {
                width: plane.width,
                height: plane.height,
                fourcc: plane.fourcc,
                stride: plane.stride,
            }
        })
    }

    fn create_texture(&self, image: EglImage) -> Result<glow::NativeTexture, ImportError> {
        self.make_current()?;
        // SAFETY: the context is current; `image` is a live EGLImage of this display.
        unsafe {
            let texture = self.gl.create_texture().map_err(ImportError::TextureCreation)?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            (self.image_target_texture_2d_oes)(glow::TEXTURE_2D, image.as_ptr());
            Ok(texture)
        }
    }

    fn create_framebuffer(
        &self,
        texture: glow::NativeTexture,
    ) -> Result<glow::NativeFramebuffer, ImportError> {
        // SAFETY: the context is current (made so by create_texture).
        unsafe {
            let framebuffer = self
                .gl
                .create_framebuffer()
                .map_err(ImportError::FramebufferCreation)?;
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            Ok(framebuffer)
        }
    }

    fn check_framebuffer(&self, framebuffer: glow::NativeFramebuffer) -> Result<(), ImportError> {
        // SAFETY: the context is current and `framebuffer` belongs to it.
        let status = unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            self.gl.check_framebuffer_status(glow::FRAMEBUFFER)
        };
        if status == glow::FRAMEBUFFER_COMPLETE {
            Ok(())
        } else {
            error!("FBO creation failed");
            Err(ImportError::IncompleteFramebuffer(status))
        }
    }

    fn fill(&self, framebuffer: glow::NativeFramebuffer, rgba: [f32; 4]) -> Result<(), ImportError> {
        // SAFETY: the context is current and `framebuffer` belongs to it.
        let gl_error = unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            self.gl.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
            self.gl.finish();
            self.gl.get_error()
        };
        if gl_error == glow::NO_ERROR {
            Ok(())
        } else {
            Err(ImportError::Render(format!("GL error {:#x} while clearing", gl_error)))
        }
    }

    fn destroy_framebuffer(&self, framebuffer: glow::NativeFramebuffer) {
        // SAFETY: `framebuffer` was created by this context and is not used afterwards.
        unsafe { self.gl.delete_framebuffer(framebuffer) };
    }

    fn destroy_texture(&self, texture: glow::NativeTexture) {
        // SAFETY: `texture` was created by this context and is not used afterwards.
        unsafe { self.gl.delete_texture(texture) };
    }

    fn destroy_image(&self, image: EglImage) {
        // SAFETY: `image` was created on this display and no texture references it anymore.
        let ok = unsafe { (self.destroy_image_khr)(self.display.as_ptr(), image.as_ptr()) };
        if ok == egl::FALSE {
            warn!("eglDestroyImageKHR failed for {:?}", image);
        }
    }
}

impl Drop for EglImporter {
    fn drop(&mut self) {
        if self.egl.make_current(self.display, None, None, None).is_err() {
            warn!("Failed to release EGL context during teardown");
        }
        if self.egl.destroy_surface(self.display, self.pbuffer).is_err() {
            warn!("Failed to destroy EGL pbuffer surface");
        }
        if self.egl.destroy_context(self.display, self.context).is_err() {
            warn!("Failed to destroy EGL context");
        }
        if self.egl.terminate(self.display).is_err() {
            warn!("Failed to terminate EGL display");
        }
        debug!("EGL importer torn down");
    }
}
