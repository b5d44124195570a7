//! 암호화 모듈 - X25519 봉인 상자 + ChaCha20-Poly1305 대칭 채널
//!
//! 흐름:
//! 1. 클라이언트가 X25519 키쌍 생성, 공개키 전송
//! 2. 서버가 세션 키 생성 후 임시 X25519 키로 봉인 (HKDF-SHA256 → ChaCha20-Poly1305)
//! 3. 클라이언트가 개인키로 봉인 해제
//! 4. 이후 모든 페이로드는 세션 키로 암호화

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret, StaticSecret};

/// X25519 공개키 (32 bytes)
pub const PUBLIC_KEY_SIZE: usize = 32;

/// 세션 키 크기 (ChaCha20-Poly1305, 32 bytes)
pub const SESSION_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce 크기 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// ChaCha20-Poly1305 태그 크기 (16 bytes)
pub const TAG_SIZE: usize = 16;

/// 암호문 하나당 추가되는 바이트 (nonce + tag)
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

const KEK_INFO: &[u8] = b"sfs-handshake-v1";

/// 암호화 오류
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("유효하지 않은 공개키: {0}")]
    InvalidKey(String),
    #[error("암호화 실패: {0}")]
    EncryptionFailed(String),
    #[error("복호화 실패")]
    DecryptionFailed,
    #[error("잘못된 키 크기: {0}")]
    InvalidKeySize(usize),
    #[error("키 유도 실패")]
    KeyDerivationFailed,
}

/// 대칭 세션 키
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// OS 난수로 새 세션 키 생성
    pub fn generate() -> Self {
        let mut key = [0u8; SESSION_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; SESSION_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeySize(bytes.len()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }
}

// 키 바이트는 로그에 남기지 않음
impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// 대칭 채널
///
/// 출력 형식: nonce(12) + ciphertext(원본 + 16바이트 태그)
/// nonce는 메시지마다 OS 난수로 생성 (양방향이 같은 키를 쓰므로 카운터 대신 난수)
#[derive(Clone)]
pub struct SessionCipher {
    cipher: ChaCha20Poly1305,
}

impl SessionCipher {
    pub fn new(key: &SessionKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
        }
    }

    /// 평문 암호화
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// 암호문 복호화 (태그 불일치, 다른 키, 손상 모두 DecryptionFailed)
    pub fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if encrypted.len() < SEAL_OVERHEAD {
            return Err(CryptoError::DecryptionFailed);
        }

        let (nonce, ciphertext) = encrypted.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionCipher(..)")
    }
}

/// 봉인된 세션 키 (서버 → 클라이언트 핸드쉐이크 응답)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedSessionKey {
    /// 서버 임시 공개키
    pub ephemeral_public: [u8; PUBLIC_KEY_SIZE],
    /// nonce + 암호화된 세션 키
    pub ciphertext: Vec<u8>,
}

impl SealedSessionKey {
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// 클라이언트 측 핸드쉐이크 키쌍 (핸드쉐이크마다 새로 생성)
pub struct HandshakeKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl HandshakeKeyPair {
    /// 새 키쌍 생성
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// 공개키를 바이트로 변환
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// 봉인된 세션 키 해제
    pub fn open_session_key(&self, sealed: &SealedSessionKey) -> Result<SessionKey, CryptoError> {
        let ephemeral_public = PublicKey::from(sealed.ephemeral_public);
        let shared = self.secret.diffie_hellman(&ephemeral_public);
        if !shared.was_contributory() {
            return Err(CryptoError::DecryptionFailed);
        }

        let kek = derive_kek(&shared, &ephemeral_public, &self.public)?;
        let key_bytes = SessionCipher::new(&kek).decrypt(&sealed.ciphertext)?;
        SessionKey::from_bytes(&key_bytes)
    }
}

/// 상대방 공개키 파싱
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let raw: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("expected {} bytes, got {}", PUBLIC_KEY_SIZE, bytes.len()))
    })?;
    Ok(PublicKey::from(raw))
}

/// 상대방 공개키로 세션 키 봉인
pub fn seal_session_key(
    peer_public: &PublicKey,
    key: &SessionKey,
) -> Result<SealedSessionKey, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(peer_public);
    // 저차수 점이면 공유 비밀이 상대방 키와 무관해짐
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey("low-order public key".into()));
    }

    let kek = derive_kek(&shared, &ephemeral_public, peer_public)?;
    let ciphertext = SessionCipher::new(&kek).encrypt(key.as_bytes())?;

    Ok(SealedSessionKey {
        ephemeral_public: *ephemeral_public.as_bytes(),
        ciphertext,
    })
}

/// 공유 비밀에서 키 암호화 키 유도 (salt = 임시 공개키 || 수신자 공개키)
fn derive_kek(
    shared: &SharedSecret,
    ephemeral_public: &PublicKey,
    recipient_public: &PublicKey,
) -> Result<SessionKey, CryptoError> {
    let mut salt = [0u8; PUBLIC_KEY_SIZE * 2];
    salt[..PUBLIC_KEY_SIZE].copy_from_slice(ephemeral_public.as_bytes());
    salt[PUBLIC_KEY_SIZE..].copy_from_slice(recipient_public.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(&salt[..]), shared.as_bytes());
    let mut okm = [0u8; SESSION_KEY_SIZE];
    hkdf.expand(KEK_INFO, &mut okm)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(SessionKey(okm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = SessionCipher::new(&SessionKey::generate());

        let cases: [&[u8]; 3] = [b"", b"a.txt, b.txt", &[0xABu8; 2048]];
        for plaintext in cases {
            let encrypted = cipher.encrypt(plaintext).unwrap();
            assert_eq!(encrypted.len(), plaintext.len() + SEAL_OVERHEAD);
            assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_nonce_is_fresh_per_message() {
        let cipher = SessionCipher::new(&SessionKey::generate());
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let alice = SessionCipher::new(&SessionKey::generate());
        let bob = SessionCipher::new(&SessionKey::generate());

        let encrypted = alice.encrypt(b"Hello, SFS!").unwrap();
        assert!(matches!(bob.decrypt(&encrypted), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = SessionCipher::new(&SessionKey::generate());
        let mut encrypted = cipher.encrypt(b"chunk data").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x01;
        assert!(matches!(cipher.decrypt(&encrypted), Err(CryptoError::DecryptionFailed)));

        // nonce + tag보다 짧은 입력
        assert!(matches!(cipher.decrypt(&[0u8; 10]), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_seal_and_open_session_key() {
        let client = HandshakeKeyPair::generate();
        let server_key = SessionKey::generate();

        let peer_public = parse_public_key(&client.public_key_bytes()).unwrap();
        let sealed = seal_session_key(&peer_public, &server_key).unwrap();

        let bytes = sealed.to_bytes().unwrap();
        let restored = SealedSessionKey::from_bytes(&bytes).unwrap();
        let opened = client.open_session_key(&restored).unwrap();

        assert_eq!(opened, server_key);
    }

    #[test]
    fn test_open_with_other_keypair_fails() {
        let client = HandshakeKeyPair::generate();
        let eavesdropper = HandshakeKeyPair::generate();

        let peer_public = parse_public_key(&client.public_key_bytes()).unwrap();
        let sealed = seal_session_key(&peer_public, &SessionKey::generate()).unwrap();

        assert!(eavesdropper.open_session_key(&sealed).is_err());
    }

    #[test]
    fn test_invalid_public_keys() {
        assert!(matches!(parse_public_key(&[1u8; 16]), Err(CryptoError::InvalidKey(_))));
        assert!(matches!(parse_public_key(&[]), Err(CryptoError::InvalidKey(_))));

        // 0은 저차수 점
        let zero = parse_public_key(&[0u8; PUBLIC_KEY_SIZE]).unwrap();
        assert!(matches!(
            seal_session_key(&zero, &SessionKey::generate()),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_session_key_debug_is_redacted() {
        let key = SessionKey::generate();
        assert_eq!(format!("{:?}", key), "SessionKey(..)");
    }
}
