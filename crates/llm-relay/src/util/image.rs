// White placeholder images for the Gemini image-preview aspect-ratio
// fixup. Pre-encoded base64 PNGs, one per supported ratio.

/// Instruction prepended with the placeholder so generation covers the
/// full canvas of the requested ratio.
pub const IMAGE_COVER_INSTRUCTION: &str = "Based on the following requirements, create an image \
within the uploaded picture. The new content *MUST* completely cover the entire area of the \
original picture, maintaining its exact proportions, and *NO* blank areas should appear.";

const WHITE_IMAGES: &[(&str, &str)] = &[
    ("1:1", "iVBORw0KGgoAAAANSUhEUgAAAEAAAABACAAAAACPAi4CAAAAKUlEQVR42u3MQREAAAwCIPuX1hD77SAA6VEEAoFAIBAIBAKBQCAQfA8Gpwvw4qrwDDIAAAAASUVORK5CYII="),
    ("2:3", "iVBORw0KGgoAAAANSUhEUgAAAEAAAABgCAAAAACIris0AAAAL0lEQVR42u3MMQEAAAwCIPuX1hA7BwFIjyIQCAQCgUAgEAgEAoFAIBAIBAKB4Fswq7TpWiSq+9sAAAAASUVORK5CYII="),
    ("3:2", "iVBORw0KGgoAAAANSUhEUgAAAGAAAABACAAAAADAXy3SAAAAMUlEQVR42u3NMQ0AAAwDoPo33arYsQQMkB6LQCAQCAQCgUAgEAgEAoFAIBAIBIJvwQAVMulaBgAsPgAAAABJRU5ErkJggg=="),
    ("3:4", "iVBORw0KGgoAAAANSUhEUgAAAGAAAACACAAAAADRtzNmAAAARklEQVR42u3NMQ0AAAwDoPo33arYsQQMkB6LQCAQCAQCgUAgEAgEAoFAIBAIBAKBQCAQCAQCgUAgEAgEAoFAIBAIBILvwQAkSNLC8/ggtgAAAABJRU5ErkJggg=="),
    ("4:3", "iVBORw0KGgoAAAANSUhEUgAAAIAAAABgCAAAAADwESWVAAAASUlEQVR42u3OIQEAAAACIP+f1hkWWEB6FgEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQGBd2D3RtLCm36WzQAAAABJRU5ErkJggg=="),
    ("4:5", "iVBORw0KGgoAAAANSUhEUgAAAEAAAABQCAAAAACM1CyZAAAALElEQVR42u3MMQEAAAwCIPuX1hA7BwFIjyIQCAQCgUAgEAgEAoFAIBAIvgQDz/DtHlu2VA8AAAAASUVORK5CYII="),
    ("5:4", "iVBORw0KGgoAAAANSUhEUgAAAFAAAABACAAAAACorK/qAAAALUlEQVR42u3MQREAAAwCIPuX1hJ77SAA6bEIhUKhUCgUCoVCoVAoFAqFwi/hAGaP7R5vz3jUAAAAAElFTkSuQmCC"),
    ("9:16", "iVBORw0KGgoAAAANSUhEUgAAAEgAAACACAAAAACNPXBCAAAAOklEQVR42u3MMQEAAAwCIPuX1hL7BgFIj0QkEolEIpFIJBKJRCKRSCQSiUQikUgkEolEIpFIJBJ9iwZ/O94OxsYSLQAAAABJRU5ErkJggg=="),
    ("16:9", "iVBORw0KGgoAAAANSUhEUgAAAIAAAABICAAAAAAb7qLOAAAAPUlEQVR42u3OIQEAAAACIP+f1hkWWEB6FgEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQGBd2A0L94OKMU8rgAAAABJRU5ErkJggg=="),
    ("21:9", "iVBORw0KGgoAAAANSUhEUgAAAKgAAABICAAAAABHZOHqAAAASUlEQVR42u3OAQkAAAwDoPUvvcU4B01g+kRERUVFRUVFRUVFRUVFRUVFRUVFRUVFRUVFRUVFRUVFRUVFRUVFRUVFRUVFRUVF7w3QbROCOIPMpAAAAABJRU5ErkJggg=="),
];

/// Base64 white PNG for a supported aspect ratio, `None` otherwise.
pub fn white_image_base64(aspect_ratio: &str) -> Option<&'static str> {
    WHITE_IMAGES
        .iter()
        .find(|(ratio, _)| *ratio == aspect_ratio)
        .map(|(_, b64)| *b64)
}
