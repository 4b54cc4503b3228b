#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use totem_core::backup::{checksum, reassemble_chunks, split_into_chunks, BackupChunk};

#[derive(Arbitrary, Debug)]
struct Input {
    payload: String,
    chunk_size: u8,
    shuffle: Vec<u8>,
    forged: Vec<(usize, usize, String)>,
}

fuzz_target!(|input: Input| {
    let chunk_size = (input.chunk_size as usize).max(1);
    let sum = checksum(&input.payload);

    // Split then reassemble in any order must reproduce the payload
    let mut chunks = split_into_chunks(&input.payload, chunk_size);
    if !chunks.is_empty() {
        for (i, s) in input.shuffle.iter().enumerate() {
            let len = chunks.len();
            chunks.swap(i % len, *s as usize % len);
        }
        let joined = reassemble_chunks(&chunks, &sum)
            .expect("Reassembly of a complete chunk set must succeed");
        assert_eq!(joined, input.payload, "Chunk round-trip mismatch");
    }

    // Arbitrary chunk sets must not panic
    let forged: Vec<BackupChunk> = input
        .forged
        .into_iter()
        .map(|(index, total, data)| BackupChunk { index, total, data })
        .collect();
    let _ = reassemble_chunks(&forged, &sum);
});
