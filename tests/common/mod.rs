//! Synthetic container files for the integration tests.

#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

pub fn write_temp_file(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(data).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

fn u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

pub fn make_box(name: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(name);
    out.extend_from_slice(payload);
    out
}

pub fn make_full_box(name: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut payload = ((u32::from(version) << 24) | flags).to_be_bytes().to_vec();
    payload.extend_from_slice(body);
    make_box(name, &payload)
}

fn avc1_entry(width: u16, height: u16) -> Vec<u8> {
    let mut body = vec![0u8; 78];
    body[7] = 1;
    body[24..26].copy_from_slice(&width.to_be_bytes());
    body[26..28].copy_from_slice(&height.to_be_bytes());
    body.extend_from_slice(&make_box(
        b"avcC",
        &[1, 0x42, 0xC0, 0x1E, 0xFF, 0xE1, 0, 2, 0x67, 0x42, 1, 0, 1, 0x68],
    ));
    make_box(b"avc1", &body)
}

fn video_trak(sizes: &[u32], chunk_offset: u32) -> Vec<u8> {
    let count = sizes.len() as u32;
    let stsd = make_full_box(b"stsd", 0, 0, &[u32s(&[1]), avc1_entry(320, 240)].concat());
    let stts = make_full_box(b"stts", 0, 0, &u32s(&[1, count, 500]));
    let stsc = make_full_box(b"stsc", 0, 0, &u32s(&[1, 1, count, 1]));
    let stsz = make_full_box(b"stsz", 0, 0, &[u32s(&[0, count]), u32s(sizes)].concat());
    let stco = make_full_box(b"stco", 0, 0, &u32s(&[1, chunk_offset]));
    let sync: &[u32] = if sizes.is_empty() { &[0] } else { &[1, 1] };
    let stss = make_full_box(b"stss", 0, 0, &u32s(sync));
    let stbl = make_box(b"stbl", &[stsd, stts, stsc, stsz, stco, stss].concat());
    let minf = make_box(b"minf", &stbl);
    let mut mdhd_body = vec![0u8; 8];
    mdhd_body.extend_from_slice(&u32s(&[1000, count * 500]));
    mdhd_body.extend_from_slice(&[0x15, 0xc7, 0, 0]);
    let mdhd = make_full_box(b"mdhd", 0, 0, &mdhd_body);
    let hdlr = make_full_box(b"hdlr", 0, 0, &[u32s(&[0]), b"vide".to_vec(), vec![0; 13]].concat());
    let mdia = make_box(b"mdia", &[mdhd, hdlr, minf].concat());
    let tkhd = make_full_box(b"tkhd", 0, 7, &[vec![0; 8], u32s(&[1]), vec![0; 68]].concat());
    make_box(b"trak", &[tkhd, mdia].concat())
}

/// Progressive MP4 with one H.264 track of `sizes` byte samples, 500 ms apart, each filled
/// with its 1-based index. Only the first sample is a sync sample.
pub fn build_mp4(sizes: &[u32], moov_last: bool) -> Vec<u8> {
    let ftyp = make_box(b"ftyp", &[b"isom".to_vec(), vec![0, 0, 2, 0], b"mp41".to_vec()].concat());
    let mut mvhd_body = vec![0u8; 8];
    mvhd_body.extend_from_slice(&u32s(&[1000, sizes.len() as u32 * 500]));
    mvhd_body.extend_from_slice(&[0; 80]);
    let mvhd = make_full_box(b"mvhd", 0, 0, &mvhd_body);
    let payload: Vec<u8> = sizes
        .iter()
        .enumerate()
        .flat_map(|(i, &s)| std::iter::repeat(i as u8 + 1).take(s as usize))
        .collect();
    let mdat = make_box(b"mdat", &payload);
    let moov_len = make_box(b"moov", &[mvhd.clone(), video_trak(sizes, 0)].concat()).len();
    let data_offset = if moov_last {
        ftyp.len() + 8
    } else {
        ftyp.len() + moov_len + 8
    };
    let moov = make_box(b"moov", &[mvhd, video_trak(sizes, data_offset as u32)].concat());
    if moov_last {
        [ftyp, mdat, moov].concat()
    } else {
        [ftyp, moov, mdat].concat()
    }
}

fn riff_chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// 16-bit PCM WAV file holding `frames` frames of a ramp.
pub fn build_wav(channels: u16, rate: u32, frames: usize) -> Vec<u8> {
    let block = channels * 2;
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&rate.to_le_bytes());
    fmt.extend_from_slice(&(rate * u32::from(block)).to_le_bytes());
    fmt.extend_from_slice(&block.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());
    let data: Vec<u8> = (0..frames * block as usize).map(|i| i as u8).collect();
    let body = [b"WAVE".to_vec(), riff_chunk(b"fmt ", &fmt), riff_chunk(b"data", &data)].concat();
    riff_chunk(b"RIFF", &body)
}

fn ogg_page(header_type: u8, granule: i64, sequence: u32, packets: &[&[u8]]) -> Vec<u8> {
    let mut lacing = Vec::new();
    for packet in packets {
        let mut len = packet.len();
        while len >= 255 {
            lacing.push(255);
            len -= 255;
        }
        lacing.push(len as u8);
    }
    let mut page = b"OggS".to_vec();
    page.push(0);
    page.push(header_type);
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&0x0BAD_CAFEu32.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&0u32.to_le_bytes());
    page.push(lacing.len() as u8);
    page.extend_from_slice(&lacing);
    for packet in packets {
        page.extend_from_slice(packet);
    }
    page
}

pub const OGG_SERIAL: u32 = 0x0BAD_CAFE;

/// Opus stream of `pages` pages holding two 20 ms packets each, tagged with `TITLE=Tone`.
pub fn build_ogg_opus(pages: usize) -> Vec<u8> {
    let mut head = b"OpusHead".to_vec();
    head.extend_from_slice(&[1, 1]);
    head.extend_from_slice(&312u16.to_le_bytes());
    head.extend_from_slice(&48_000u32.to_le_bytes());
    head.extend_from_slice(&[0, 0, 0]);

    let mut tags = b"OpusTags".to_vec();
    let vendor = b"libopus";
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor);
    tags.extend_from_slice(&1u32.to_le_bytes());
    let comment = b"TITLE=Tone";
    tags.extend_from_slice(&(comment.len() as u32).to_le_bytes());
    tags.extend_from_slice(comment);

    let mut data = ogg_page(0x02, 0, 0, &[&head]);
    data.extend(ogg_page(0, 0, 1, &[&tags]));
    for page in 0..pages {
        let first = [31 << 3, page as u8, 0xAA];
        let second = [31 << 3, page as u8, 0xBB];
        let header_type = if page + 1 == pages { 0x04 } else { 0 };
        let granule = (page as i64 + 1) * 1920;
        data.extend(ogg_page(header_type, granule, page as u32 + 2, &[&first, &second]));
    }
    data
}

fn moof(sequence: u32, base_decode_time: u64, sizes: &[u32], data_offset: u32) -> Vec<u8> {
    let mfhd = make_full_box(b"mfhd", 0, 0, &u32s(&[sequence]));
    // default-base-is-moof
    let tfhd = make_full_box(b"tfhd", 0, 0x02_0000, &u32s(&[1]));
    let tfdt = make_full_box(b"tfdt", 1, 0, &base_decode_time.to_be_bytes());
    // data offset, first sample flags (sync), sample sizes
    let trun = make_full_box(
        b"trun",
        0,
        0x01 | 0x04 | 0x200,
        &[
            u32s(&[sizes.len() as u32, data_offset, 0x0200_0000]),
            u32s(sizes),
        ]
        .concat(),
    );
    let traf = make_box(b"traf", &[tfhd, tfdt, trun].concat());
    make_box(b"moof", &[mfhd, traf].concat())
}

/// Fragmented MP4: an init segment, then one moof/mdat pair per entry of `fragments`. Samples
/// last one second and only the first sample of each fragment is a sync sample. Returns the
/// file and the position of every moof.
pub fn build_fragmented_mp4(fragments: &[&[u32]]) -> (Vec<u8>, Vec<u64>) {
    let ftyp = make_box(b"ftyp", &[b"iso6".to_vec(), vec![0; 4], b"dash".to_vec()].concat());
    let mvhd = make_full_box(
        b"mvhd",
        0,
        0,
        &[vec![0; 8], u32s(&[1000, 0]), vec![0; 80]].concat(),
    );
    let trex = make_full_box(b"trex", 0, 0, &u32s(&[1, 1, 1000, 0, 0x0001_0000]));
    let mvex = make_box(b"mvex", &trex);
    let moov = make_box(b"moov", &[mvhd, mvex, video_trak(&[], 0)].concat());

    let mut data = [ftyp, moov].concat();
    let mut positions = Vec::new();
    let mut decode_time = 0u64;
    for (index, sizes) in fragments.iter().enumerate() {
        positions.push(data.len() as u64);
        let moof_len = moof(index as u32 + 1, decode_time, sizes, 0).len() as u32;
        data.extend(moof(index as u32 + 1, decode_time, sizes, moof_len + 8));
        let payload: Vec<u8> = sizes
            .iter()
            .flat_map(|&s| std::iter::repeat(index as u8 + 1).take(s as usize))
            .collect();
        data.extend(make_box(b"mdat", &payload));
        decode_time += sizes.len() as u64 * 1000;
    }
    (data, positions)
}
