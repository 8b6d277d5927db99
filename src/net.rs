//! Listening-socket acquisition with free-port fallback.

/// Binds the fixture's listening socket on the wildcard address.
///
/// If the requested port is taken (or not bindable without privileges) the
/// bind is retried on port 0 so the OS assigns a free one; a warning names
/// both ports. Requesting port 0 never warns. Other socket errors propagate.
pub fn acquire_listener(requested_port: u16) -> std::io::Result<(std::net::TcpListener, u16)> {
    let listener = match std::net::TcpListener::bind(("0.0.0.0", requested_port)) {
        Ok(listener) => listener,
        Err(error)
            if requested_port != 0
                && matches!(
                    error.kind(),
                    std::io::ErrorKind::AddrInUse | std::io::ErrorKind::PermissionDenied
                ) =>
        {
            std::net::TcpListener::bind(("0.0.0.0", 0))?
        }
        Err(error) => return Err(error),
    };
    let actual_port = listener.local_addr()?.port();
    if requested_port != 0 && requested_port != actual_port {
        tracing::warn!(
            "the desired port {requested_port} was not free, \
             the server will run on port {actual_port}"
        );
    }
    Ok((listener, actual_port))
}
