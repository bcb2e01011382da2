// Test utilities: fixture images and a minimal HTTP origin

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, RgbaImage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Gradient image encoded in `format`
pub fn fixture_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut img = RgbaImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = image::Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255]);
    }
    let mut buffer = Cursor::new(Vec::new());
    if format == ImageFormat::Jpeg {
        image::DynamicImage::ImageRgba8(img)
            .to_rgb8()
            .write_to(&mut buffer, format)
            .unwrap();
    } else {
        img.write_to(&mut buffer, format).unwrap();
    }
    buffer.into_inner()
}

pub fn fixture_png(width: u32, height: u32) -> Vec<u8> {
    fixture_image(width, height, ImageFormat::Png)
}

/// Dimensions of encoded image bytes
pub fn dimensions_of(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).expect("output should decode");
    (img.width(), img.height())
}

#[derive(Clone)]
struct Route {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    delay: Duration,
    /// Send `body` this many times with chunked encoding
    repeat: Option<usize>,
    /// Redirect to this host and path on the origin's port
    redirect: Option<(String, String)>,
}

impl Route {
    fn new(status: u16, content_type: &'static str, body: &[u8]) -> Self {
        Route {
            status,
            content_type,
            body: body.to_vec(),
            delay: Duration::ZERO,
            repeat: None,
            redirect: None,
        }
    }
}

/// Tiny HTTP/1.1 origin serving canned responses, one per path
pub struct MockOrigin {
    addr: SocketAddr,
    hits: Arc<HashMap<String, AtomicUsize>>,
    sent: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

pub struct MockOriginBuilder {
    routes: HashMap<String, Route>,
}

impl MockOrigin {
    pub fn builder() -> MockOriginBuilder {
        MockOriginBuilder {
            routes: HashMap::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Body bytes written to clients so far
    pub fn bytes_sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .get(path)
            .map_or(0, |count| count.load(Ordering::SeqCst))
    }
}

impl Drop for MockOrigin {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockOriginBuilder {
    pub fn route(mut self, path: &str, status: u16, content_type: &'static str, body: &[u8]) -> Self {
        self.routes
            .insert(path.to_string(), Route::new(status, content_type, body));
        self
    }

    /// Chunked response without Content-Length: `chunk` sent `count` times
    pub fn chunked_route(mut self, path: &str, chunk: &[u8], count: usize) -> Self {
        let mut route = Route::new(200, "image/png", chunk);
        route.repeat = Some(count);
        self.routes.insert(path.to_string(), route);
        self
    }

    /// 302 to `http://{host}:{origin port}{target}`
    pub fn redirect_route(mut self, path: &str, host: &str, target: &str) -> Self {
        let mut route = Route::new(302, "text/plain", b"");
        route.redirect = Some((host.to_string(), target.to_string()));
        self.routes.insert(path.to_string(), route);
        self
    }

    pub fn slow_route(mut self, path: &str, body: &[u8], delay: Duration) -> Self {
        let mut route = Route::new(200, "image/png", body);
        route.delay = delay;
        self.routes.insert(path.to_string(), route);
        self
    }

    pub async fn start(self) -> MockOrigin {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits: Arc<HashMap<String, AtomicUsize>> = Arc::new(
            self.routes
                .keys()
                .map(|path| (path.clone(), AtomicUsize::new(0)))
                .collect(),
        );
        let routes = Arc::new(self.routes);

        let sent = Arc::new(AtomicUsize::new(0));

        let task_hits = Arc::clone(&hits);
        let task_sent = Arc::clone(&sent);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&routes);
                let hits = Arc::clone(&task_hits);
                let sent = Arc::clone(&task_sent);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&request);
                    let path = request
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();

                    let route = routes
                        .get(&path)
                        .cloned()
                        .unwrap_or_else(|| Route::new(404, "text/plain", b"not found"));
                    if let Some(count) = hits.get(&path) {
                        count.fetch_add(1, Ordering::SeqCst);
                    }
                    if !route.delay.is_zero() {
                        tokio::time::sleep(route.delay).await;
                    }

                    if let Some(count) = route.repeat {
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                            route.content_type
                        );
                        if stream.write_all(head.as_bytes()).await.is_err() {
                            return;
                        }
                        let frame_head = format!("{:x}\r\n", route.body.len());
                        for _ in 0..count {
                            let frame = [frame_head.as_bytes(), &route.body, b"\r\n"].concat();
                            if stream.write_all(&frame).await.is_err() {
                                return;
                            }
                            sent.fetch_add(route.body.len(), Ordering::SeqCst);
                        }
                        let _ = stream.write_all(b"0\r\n\r\n").await;
                        let _ = stream.shutdown().await;
                        return;
                    }

                    let location = route
                        .redirect
                        .as_ref()
                        .map(|(host, target)| {
                            format!("Location: http://{}:{}{}\r\n", host, addr.port(), target)
                        })
                        .unwrap_or_default();
                    let head = format!(
                        "HTTP/1.1 {} X\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
                        route.status,
                        route.content_type,
                        route.body.len(),
                        location
                    );
                    let _ = stream.write_all(head.as_bytes()).await;
                    if stream.write_all(&route.body).await.is_ok() {
                        sent.fetch_add(route.body.len(), Ordering::SeqCst);
                    }
                    let _ = stream.shutdown().await;
                });
            }
        });

        MockOrigin {
            addr,
            hits,
            sent,
            handle,
        }
    }
}
