#[path = "../src/video.rs"]
#[allow(dead_code)]
mod video;

use video::{parse_video_url, provider_for_host, VideoProvider};

#[test]
fn youtube_forms_share_one_id() {
    for url in [
        "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        "https://youtu.be/dQw4w9WgXcQ",
        "https://www.youtube.com/embed/dQw4w9WgXcQ",
    ] {
        let info = parse_video_url(url).unwrap_or_else(|| panic!("no match for {}", url));
        assert_eq!(info.provider, VideoProvider::YouTube);
        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(
            info.thumbnail.as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/maxresdefault.jpg")
        );
    }
}

#[test]
fn vimeo_and_khan_have_no_thumbnail() {
    let vimeo = parse_video_url("https://vimeo.com/video/123456789").expect("vimeo");
    assert_eq!(vimeo.provider, VideoProvider::Vimeo);
    assert_eq!(vimeo.id, "123456789");
    assert_eq!(vimeo.thumbnail, None);
    assert_eq!(
        serde_json::to_value(&vimeo).expect("serialize"),
        serde_json::json!({ "type": "vimeo", "id": "123456789", "thumbnail": null })
    );

    let khan = parse_video_url("https://www.khanacademy.org/math/algebra/v/intro-to-algebra")
        .expect("khan");
    assert_eq!(khan.provider, VideoProvider::KhanAcademy);
    assert_eq!(khan.id, "intro-to-algebra");
    assert_eq!(khan.thumbnail, None);
}

#[test]
fn unrecognised_urls_are_not_videos() {
    assert_eq!(parse_video_url("https://example.com/video"), None);
    assert_eq!(parse_video_url(""), None);
    assert_eq!(provider_for_host("https://example.com/watch?v=x"), None);
    assert_eq!(
        provider_for_host("https://youtube.com/watch?v=test123"),
        Some(VideoProvider::YouTube)
    );
}
