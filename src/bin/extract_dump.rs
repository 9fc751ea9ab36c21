use mediaextractor::{
    extract_to_end, BufferedInput, CollectingOutput, ExtractorInput, MediaExtractor,
};
use std::env;

fn main() {
    println!("🔍 Media Extract Dump - Tracks, Formats and Samples");
    println!("====================================================");

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: extract_dump <file> [max-samples-per-track]");
        println!("Example: extract_dump clip.mp4 20");
        return;
    }
    let file_path = &args[1];
    let max_samples = args
        .get(2)
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(10);

    match dump(file_path, max_samples) {
        Ok(_) => println!("\n✅ Extraction completed successfully"),
        Err(e) => println!("\n❌ Extraction failed: {}", e),
    }
}

fn dump(path: &str, max_samples: usize) -> Result<(), Box<dyn std::error::Error>> {
    let mut input = BufferedInput::open(path)?;
    println!("📄 File: {}", path);
    println!("📏 Size: {} bytes", input.length().unwrap_or(0));

    let mut extractor: MediaExtractor<CollectingOutput> = MediaExtractor::new();
    if !extractor.sniff(&mut input)? {
        println!("❓ No reader recognised the file");
        return Ok(());
    }
    if let Some(kind) = extractor.container_kind() {
        println!("📦 Container: {:?}", kind);
    }
    extractor.init(CollectingOutput::new())?;
    extract_to_end(&mut extractor, &mut input)?;

    let Some(output) = extractor.output() else {
        return Ok(());
    };
    if let Some(seek_map) = output.seek_map() {
        println!(
            "⏱  Duration: {:?} us, seekable: {}",
            seek_map.duration_us, seek_map.seekable
        );
    }
    for track in &output.tracks {
        println!();
        println!("🎞  Track {} ({:?})", track.id, track.track_type);
        if let Some(format) = track.format() {
            println!("   Format: {}", describe_format(format));
        }
        println!(
            "   Samples: {} ({} bytes)",
            track.samples.len(),
            track.data.len()
        );
        for sample in track.samples.iter().take(max_samples) {
            println!(
                "   ├─ t={:>10} us  size={:>7}  flags={:#06x}",
                sample.metadata.time_us, sample.metadata.size, sample.metadata.flags.0
            );
        }
        if track.samples.len() > max_samples {
            println!("   └─ ... {} more", track.samples.len() - max_samples);
        }
    }
    Ok(())
}

fn describe_format(format: &mediaextractor::Format) -> String {
    let mut parts = Vec::new();
    if let Some(mime) = format.mime_type() {
        parts.push(format!("mime={}", mime));
    }
    if let Some(codecs) = &format.codecs {
        parts.push(format!("codecs={}", codecs));
    }
    if let (Some(width), Some(height)) = (format.width, format.height) {
        parts.push(format!("size={}x{}", width, height));
    }
    if let Some(channels) = format.channel_count {
        parts.push(format!("channels={}", channels));
    }
    if let Some(rate) = format.sample_rate {
        parts.push(format!("rate={}", rate));
    }
    if let Some(language) = &format.language {
        parts.push(format!("language={}", language));
    }
    if !format.metadata.is_empty() {
        parts.push(format!("metadata={}", format.metadata.len()));
    }
    parts.join(" ")
}
