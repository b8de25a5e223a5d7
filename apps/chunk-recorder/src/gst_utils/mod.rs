use gst::prelude::*;
use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::{ChunkRecorderError, Result};

/// Elements every recording pipeline needs
const REQUIRED_ELEMENTS: &[&str] = &["queue", "tee", "mp4mux", "filesink"];

/// Elements used by the default test pipeline
const OPTIONAL_ELEMENTS: &[&str] = &[
    // Test source
    "videotestsrc",
    "clockoverlay",
    "x264enc",
    // Preview branch
    "avdec_h264",
    "videoconvert",
    "videoscale",
    "autovideosink",
];

/// Represents the capabilities detected in the GStreamer installation
#[derive(Debug, Clone)]
pub struct GstCapabilities {
    pub has_test_source: bool,
    pub has_preview: bool,
    pub available_elements: HashMap<String, bool>,
}

impl GstCapabilities {
    /// Check if a specific element is available
    pub fn has_element(&self, element: &str) -> bool {
        self.available_elements.get(element).copied().unwrap_or(false)
    }

    /// Whether the built-in default pipeline can be launched
    pub fn supports_default_pipeline(&self) -> bool {
        self.has_test_source && self.has_preview
    }
}

/// Initialize GStreamer with error handling and logging
pub fn initialize() -> Result<GstCapabilities> {
    info!("Initializing GStreamer");

    gst::init().map_err(|e| {
        error!("Failed to initialize GStreamer: {}", e);
        ChunkRecorderError::Gstreamer(e)
    })?;

    let (major, minor, micro, nano) = gst::version();
    info!("GStreamer version: {}.{}.{}.{}", major, minor, micro, nano);

    if let Ok(debug_str) = std::env::var("GST_DEBUG") {
        debug!("GST_DEBUG set to: {}", debug_str);
    }
    if let Ok(plugin_path) = std::env::var("GST_PLUGIN_PATH") {
        info!("Using custom GST_PLUGIN_PATH: {}", plugin_path);
    }

    let capabilities = discover_plugins()?;

    info!("GStreamer capabilities detected:");
    info!("  Test source: {}", capabilities.has_test_source);
    info!("  Preview branch: {}", capabilities.has_preview);

    Ok(capabilities)
}

/// Discover available GStreamer plugins and build capability map
pub fn discover_plugins() -> Result<GstCapabilities> {
    let mut available_elements = HashMap::new();

    info!("Checking required GStreamer elements...");
    let mut missing_required = Vec::new();
    for element in REQUIRED_ELEMENTS {
        let found = lookup(element);
        if !found {
            error!("Missing required element: {}", element);
            missing_required.push(element.to_string());
        }
        available_elements.insert(element.to_string(), found);
    }

    if !missing_required.is_empty() {
        return Err(ChunkRecorderError::MissingElements(missing_required));
    }
    info!("All required elements found");

    info!("Checking optional GStreamer elements...");
    for element in OPTIONAL_ELEMENTS {
        let found = lookup(element);
        if !found {
            debug!("Optional element not found: {}", element);
        }
        available_elements.insert(element.to_string(), found);
    }

    let all = |names: &[&str]| names.iter().all(|name| available_elements[*name]);
    let has_test_source = all(&["videotestsrc", "clockoverlay", "x264enc"]);
    let has_preview = all(&["avdec_h264", "videoconvert", "videoscale", "autovideosink"]);

    Ok(GstCapabilities {
        has_test_source,
        has_preview,
        available_elements,
    })
}

fn lookup(element: &str) -> bool {
    match gst::ElementFactory::find(element) {
        Some(factory) => {
            debug!("Found element: {} (rank: {:?})", element, factory.rank());
            true
        }
        None => false,
    }
}

/// Print detailed plugin information (for --check-plugins flag)
pub fn print_plugin_info(capabilities: &GstCapabilities) {
    println!("\nGStreamer Plugin Discovery Report");
    println!("==================================");

    let (major, minor, micro, nano) = gst::version();
    println!("\nGStreamer Version: {}.{}.{}.{}", major, minor, micro, nano);

    if let Ok(plugin_path) = std::env::var("GST_PLUGIN_PATH") {
        println!("Custom Plugin Path: {}", plugin_path);
    }

    println!("\nRequired Elements:");
    for element in REQUIRED_ELEMENTS {
        println!("  {} {}", status(capabilities.has_element(element)), element);
    }

    println!("\nDefault Pipeline Elements:");
    for element in OPTIONAL_ELEMENTS {
        println!("  {} {}", status(capabilities.has_element(element)), element);
    }

    println!(
        "\nDefault pipeline: {}",
        if capabilities.supports_default_pipeline() {
            "available"
        } else {
            "unavailable, configure [pipeline] launch"
        }
    );

    let registry = gst::Registry::get();
    println!("\nRegistry Statistics:");
    println!("  Total Plugins: {}", registry.plugins().len());
}

fn status(found: bool) -> &'static str {
    if found {
        "✓"
    } else {
        "✗"
    }
}
