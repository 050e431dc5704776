use async_trait::async_trait;

use crate::errors::DriverError;

/// The seam between the scraping core and the browser backend.
///
/// A `Session` owns exactly one driver for its whole flow; the underlying
/// automation handle is not safe to share across concurrent requests, so
/// exclusivity is enforced one level up by `Session` ownership rather than
/// by locking here.
#[async_trait]
pub trait PortalDriver: Send {
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    /// Fill a form input located by its `name` attribute.
    async fn fill_by_name(&self, name: &str, value: &str) -> Result<(), DriverError>;

    /// Click a control located by its `name` attribute. Every named control
    /// on the portal submits a form, so this also waits out the navigation.
    async fn click_by_name(&self, name: &str) -> Result<(), DriverError>;

    /// Whether `css` currently matches in the top document.
    async fn element_exists(&self, css: &str) -> Result<bool, DriverError>;

    /// Click through script execution rather than a native click. The popup
    /// opener can sit occluded or off-viewport in a headless window, where a
    /// native click flakes.
    async fn click_via_script(&self, css: &str) -> Result<(), DriverError>;

    /// Whether `css` matches inside the iframe matched by `frame_css`.
    async fn element_exists_in_frame(&self, frame_css: &str, css: &str)
    -> Result<bool, DriverError>;

    async fn click_in_frame(&self, frame_css: &str, css: &str) -> Result<(), DriverError>;

    /// History-back, used to return to the listing after a download.
    async fn back(&self) -> Result<(), DriverError>;

    /// Tear the browser down. Best effort.
    async fn close(&mut self) -> Result<(), DriverError>;
}
